//! Command handler registry.
//!
//! Handlers are keyed by the exact command keyword of an inbound line. Every
//! handler registered for a keyword runs, in registration order, on the
//! dispatch task. They must not block: a slow handler stalls every later
//! inbound line.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::irc::message::Message;
use crate::irc::session::Session;

/// Reacts to one inbound message. May enqueue further messages through the
/// session.
pub trait Handler: Send + Sync {
    fn handle(&self, session: &Session, message: &Message) -> Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&Session, &Message) -> Result<()> + Send + Sync,
{
    fn handle(&self, session: &Session, message: &Message) -> Result<()> {
        self(session, message)
    }
}

/// Append-only map from command keyword to its handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the handlers a session needs to become usable.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("PING", pong);
        registry.register("MODE", confirm_registration);
        registry
    }

    pub fn register<F>(&mut self, command: &str, handler: F)
    where
        F: Fn(&Session, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.register_handler(command, Arc::new(handler));
    }

    pub fn register_handler(&mut self, command: &str, handler: Arc<dyn Handler>) {
        self.handlers
            .entry(command.to_string())
            .or_default()
            .push(handler);
    }

    pub fn handler_count(&self, command: &str) -> usize {
        self.handlers.get(command).map_or(0, Vec::len)
    }

    /// Run every handler registered for `message.command`. A failing handler
    /// is logged and does not prevent the rest from running.
    ///
    /// Returns the number of handlers invoked; an unknown command is a no-op.
    pub fn dispatch(&self, session: &Session, message: &Message) -> usize {
        let Some(handlers) = self.handlers.get(&message.command) else {
            return 0;
        };
        for handler in handlers {
            if let Err(e) = handler.handle(session, message) {
                tracing::warn!(command = %message.command, error = %e, "handler failed");
            }
        }
        handlers.len()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut counts: Vec<_> = self
            .handlers
            .iter()
            .map(|(cmd, list)| (cmd.as_str(), list.len()))
            .collect();
        counts.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

/// Keep-alive: answer `PING <token>` with `PONG <token>`.
pub fn pong(session: &Session, message: &Message) -> Result<()> {
    session.send_control(pong_line(message))?;
    Ok(())
}

/// The server sends MODE for our nick once registration is accepted; take
/// that as the signal that channels may be joined.
pub fn confirm_registration(session: &Session, _message: &Message) -> Result<()> {
    if session.gate().mark_registered() {
        tracing::info!(nick = %session.nick(), "registration confirmed");
    }
    Ok(())
}

pub(crate) fn pong_line(ping: &Message) -> String {
    if ping.args.is_empty() {
        "PONG".to_string()
    } else {
        format!("PONG {}", ping.args.join(" "))
    }
}
