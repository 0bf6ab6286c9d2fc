//! Error types for the protocol layer.
//!
//! [`ParseError`] is per-line and recoverable: the read loop logs it and moves
//! on. [`SessionError`] is always fatal to the session that raised it.

use std::io;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("malformed command line: missing command field: {line:?}")]
    MissingCommand { line: String },
    #[error("malformed command line: missing argument field: {line:?}")]
    MissingArgument { line: String },
}

/// Session-fatal failures. I/O sources are shared so the error can be handed
/// to every observer of the terminated session.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("TLS setup for {host} failed: {reason}")]
    Tls { host: String, reason: String },
    #[error("failed to load client certificate: {0}")]
    Certificate(String),
    #[error("read failed: {0}")]
    Read(#[source] Arc<io::Error>),
    #[error("write failed: {0}")]
    Write(#[source] Arc<io::Error>),
    #[error("connection closed by server")]
    Closed,
    #[error("session is no longer running")]
    Terminated,
}

impl SessionError {
    pub fn read(err: io::Error) -> Self {
        Self::Read(Arc::new(err))
    }

    pub fn write(err: io::Error) -> Self {
        Self::Write(Arc::new(err))
    }
}
