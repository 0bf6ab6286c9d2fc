//! Connection pipeline.
//!
//! [`Bot`] collects configuration and handlers, then [`Bot::connect`] turns it
//! into a running [`Session`] made of five tasks:
//!
//! - reader: socket lines -> parsed [`Message`]s -> inbound channel
//! - dispatcher: inbound channel -> [`HandlerRegistry`]
//! - writer: outbound channel -> socket (the only task that writes)
//! - joiner: waits for registration, queues one JOIN per channel, opens the gate
//! - error sink: first error terminates the session
//!
//! Every write, including the handshake and JOIN lines, goes through the
//! writer task, so lines never interleave on the socket.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;

use crate::config::BotConfig;
use crate::irc::error::{ParseError, SessionError};
use crate::irc::gate::Phase;
use crate::irc::handler::{Handler, HandlerRegistry};
use crate::irc::message::Message;
use crate::irc::session::{Outbound, Session};
use crate::irc::transport::{self, Transport};

/// Inbound lines waiting for the dispatcher. Kept minimal so a slow handler
/// holds the reader back instead of piling up lines.
const INBOUND_CAPACITY: usize = 1;

/// Inbound line limit, not counting the CRLF terminator. A peer that sends
/// more than this without a newline is treated as broken.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// A configured, not yet connected bot.
pub struct Bot {
    config: BotConfig,
    registry: HandlerRegistry,
}

impl Bot {
    /// A bot with the PING and MODE handlers already registered.
    pub fn new(config: BotConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::with_builtins(),
        }
    }

    /// Register `action` for every inbound line whose command is `command`.
    pub fn add_action<F>(&mut self, command: &str, action: F) -> &mut Self
    where
        F: Fn(&Session, &Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.register(command, action);
        self.registered(command)
    }

    pub fn add_handler(&mut self, command: &str, handler: Arc<dyn Handler>) -> &mut Self {
        self.registry.register_handler(command, handler);
        self.registered(command)
    }

    fn registered(&mut self, command: &str) -> &mut Self {
        tracing::debug!(
            command,
            handlers = self.registry.handler_count(command),
            "handler registered"
        );
        self
    }

    /// Open the configured transport and run the session on it. Returns once
    /// every configured channel has been joined.
    pub async fn connect(self) -> Result<Session, SessionError> {
        tracing::info!(addr = %self.config.server.addr(), "connecting");
        match transport::connect(&self.config.server).await? {
            Transport::Plain(tcp) => self.connect_with_stream(tcp).await,
            Transport::Tls(tls) => self.connect_with_stream(*tls).await,
        }
    }

    /// Run the session over an already open stream.
    pub async fn connect_with_stream<S>(self, stream: S) -> Result<Session, SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let session = self.start(stream)?;
        match session.gate().wait_for(Phase::Joined).await {
            Phase::Joined => Ok(session),
            _ => Err(session.fatal_error().unwrap_or(SessionError::Terminated)),
        }
    }

    /// Spawn the pipeline tasks and queue the handshake, without waiting for
    /// the join to complete.
    pub fn start<S>(self, stream: S) -> Result<Session, SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        let session = Session::new(self.config, outbound_tx, error_tx);

        let nick = session.nick().to_string();
        session.send_control(format!("USER {nick} 8 * :{nick}"))?;
        session.send_control(format!("NICK {nick}"))?;

        tokio::spawn(write_loop(writer, session.clone(), outbound_rx));
        tokio::spawn(read_loop(BufReader::new(reader), session.clone(), inbound_tx));
        tokio::spawn(dispatch_loop(self.registry, session.clone(), inbound_rx));
        tokio::spawn(error_sink(session.clone(), error_rx));
        tokio::spawn(join_channels(session.clone()));

        Ok(session)
    }
}

impl fmt::Display for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.config, f)
    }
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

async fn read_loop<R>(mut reader: R, session: Session, inbound: mpsc::Sender<Message>)
where
    R: AsyncBufRead + Unpin,
{
    let gate = session.gate();
    let terminated = gate.terminated();
    tokio::pin!(terminated);
    let mut buf = Vec::with_capacity(512);

    loop {
        buf.clear();
        // Room for the CRLF of a maximal line.
        let mut limited = (&mut reader).take(MAX_LINE_LEN as u64 + 2);
        let read = tokio::select! {
            _ = &mut terminated => break,
            read = limited.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => {
                session.report(SessionError::Closed);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                session.report(SessionError::read(e));
                break;
            }
        }
        if !buf.ends_with(b"\n") && buf.len() > MAX_LINE_LEN {
            session.report(SessionError::read(io::Error::new(
                io::ErrorKind::InvalidData,
                "line too long",
            )));
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        match Message::parse(line) {
            Ok(message) => {
                if inbound.send(message).await.is_err() {
                    break;
                }
            }
            Err(ParseError::Empty) => {}
            Err(e) => tracing::warn!(error = %e, "skipping malformed line"),
        }
    }
    tracing::debug!("reader stopped");
}

async fn dispatch_loop(
    registry: HandlerRegistry,
    session: Session,
    mut inbound: mpsc::Receiver<Message>,
) {
    while let Some(message) = inbound.recv().await {
        tracing::debug!("irc << {}", message.raw);
        registry.dispatch(&session, &message);
    }
    tracing::debug!("dispatcher stopped");
}

async fn write_loop<W>(
    mut writer: W,
    session: Session,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = outbound.recv().await {
        let (line, quit) = match item {
            Outbound::Control(line) => (line, false),
            Outbound::Message(message) => (message.to_wire(), false),
            Outbound::Quit => ("QUIT".to_string(), true),
        };

        tracing::debug!("irc >> {line}");
        if let Err(e) = write_line(&mut writer, &line).await {
            session.report(SessionError::write(e));
            break;
        }
        if quit {
            let _ = writer.shutdown().await;
            break;
        }
    }
    tracing::debug!("writer stopped");
}

async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

/// Wait for the server to accept our registration, then join every configured
/// channel in order and open the gate.
async fn join_channels(session: Session) {
    if session.gate().wait_for(Phase::Registered).await != Phase::Registered {
        return;
    }

    for channel in session.channels() {
        tracing::info!(%channel, "joining");
        if session.send_control(format!("JOIN {channel}")).is_err() {
            return;
        }
    }

    if session.gate().mark_joined() {
        tracing::info!(channels = ?session.channels(), "joined");
    }
}

/// Single consumer of the error channel. Any error ends the session.
async fn error_sink(session: Session, mut errors: mpsc::UnboundedReceiver<SessionError>) {
    tokio::select! {
        Some(err) = errors.recv() => {
            tracing::error!(error = %err, "session failed");
            session.set_fatal(err);
            session.disconnect();
        }
        _ = session.gate().terminated() => {}
    }
}
