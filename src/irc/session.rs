//! Live session handle.
//!
//! A [`Session`] is a cheap, cloneable view of one running connection. It is
//! the only way handlers and the application touch the connection: they read
//! the phase, enqueue outbound traffic, and ask for disconnection. The socket
//! itself is owned by the pipeline tasks.

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Local};
use tokio::sync::mpsc;

use crate::config::BotConfig;
use crate::irc::error::SessionError;
use crate::irc::gate::{JoinGate, Phase};
use crate::irc::message::{single_line, Message};

/// Work item for the writer task.
#[derive(Debug)]
pub enum Outbound {
    /// Protocol line written verbatim, bypassing the join gate.
    Control(String),
    /// Application message, already admitted by the join gate.
    Message(Message),
    /// Write `QUIT` and close the transport.
    Quit,
}

struct Shared {
    config: BotConfig,
    gate: JoinGate,
    outbound: mpsc::UnboundedSender<Outbound>,
    errors: mpsc::UnboundedSender<SessionError>,
    fatal: OnceLock<SessionError>,
    started_at: DateTime<Local>,
}

#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    pub(crate) fn new(
        config: BotConfig,
        outbound: mpsc::UnboundedSender<Outbound>,
        errors: mpsc::UnboundedSender<SessionError>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                gate: JoinGate::new(),
                outbound,
                errors,
                fatal: OnceLock::new(),
                started_at: Local::now(),
            }),
        }
    }

    pub fn nick(&self) -> &str {
        &self.config().nick
    }

    pub fn channels(&self) -> &[String] {
        &self.config().channels
    }

    pub fn config(&self) -> &BotConfig {
        &self.shared.config
    }

    pub fn gate(&self) -> &JoinGate {
        &self.shared.gate
    }

    pub fn phase(&self) -> Phase {
        self.shared.gate.phase()
    }

    /// Enqueue an application message.
    ///
    /// Messages offered before every channel has been joined are discarded,
    /// not buffered. Returns an error only once the writer has gone away.
    pub fn send(&self, message: Message) -> Result<(), SessionError> {
        if !self.shared.gate.is_open() {
            tracing::debug!(
                phase = %self.phase(),
                line = %message,
                "dropping outbound message before join"
            );
            return Ok(());
        }
        self.enqueue(Outbound::Message(message))
    }

    /// `PRIVMSG` with no channel and `text` as the only argument.
    pub fn say(&self, text: &str) -> Result<(), SessionError> {
        self.send(Message::new("PRIVMSG", "", vec![text.to_string()]))
    }

    pub fn privmsg(&self, target: &str, text: &str) -> Result<(), SessionError> {
        self.send(Message::privmsg(target, text))
    }

    /// Enqueue a protocol line that must reach the server regardless of the
    /// join gate (keep-alives, JOIN, handshake). Embedded line breaks become
    /// spaces.
    pub fn send_control(&self, line: impl Into<String>) -> Result<(), SessionError> {
        self.enqueue(Outbound::Control(single_line(line.into())))
    }

    /// Send `QUIT` and close the transport. Anything still queued may be lost.
    /// Calling this on a terminated session does nothing.
    pub fn disconnect(&self) {
        if !self.shared.gate.terminate() {
            return;
        }
        tracing::info!(server = %self.config().server.host, "disconnecting");
        let _ = self.shared.outbound.send(Outbound::Quit);
    }

    /// Wait for the session to end. Returns the error that ended it, or `Ok`
    /// after a requested disconnect.
    pub async fn closed(&self) -> Result<(), SessionError> {
        self.shared.gate.terminated().await;
        match self.shared.fatal.get() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// The error that terminated the session, if one did.
    pub fn fatal_error(&self) -> Option<SessionError> {
        self.shared.fatal.get().cloned()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            config: self.config().clone(),
            phase: self.phase(),
            started_at: self.shared.started_at,
        }
    }

    /// Hand an error to the error sink.
    pub(crate) fn report(&self, err: SessionError) {
        if self.shared.errors.send(err).is_err() {
            tracing::debug!("error sink gone, dropping error");
        }
    }

    /// Record the fatal error. The first one wins.
    pub(crate) fn set_fatal(&self, err: SessionError) {
        let _ = self.shared.fatal.set(err);
    }

    fn enqueue(&self, item: Outbound) -> Result<(), SessionError> {
        self.shared
            .outbound
            .send(item)
            .map_err(|_| SessionError::Terminated)
    }

    /// A session with no transport behind it. The returned receiver sees
    /// everything the session enqueues.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let (errors, _) = mpsc::unbounded_channel();
        let mut config = BotConfig::default();
        config.nick = "bot".into();
        (Self::new(config, outbound, errors), rx)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("nick", &self.nick())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Point-in-time view of a session for display.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub config: BotConfig,
    pub phase: Phase,
    pub started_at: DateTime<Local>,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config)?;
        if !self.config.channels.is_empty() {
            writeln!(f)?;
        }
        writeln!(f, "nick: {}", self.config.nick)?;
        writeln!(f, "user: {}", self.config.user())?;
        writeln!(f, "state: {}", self.phase)?;
        write!(f, "since: {}", self.started_at.format("%Y-%m-%d %H:%M:%S"))
    }
}
