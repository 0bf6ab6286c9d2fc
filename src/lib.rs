//! A small IRC bot engine.
//!
//! Lines read from the server are parsed into [`Message`]s and dispatched to
//! handlers registered per command. Outbound application messages are held
//! back by a join gate until the server has accepted registration and every
//! configured channel has been joined.

pub mod config;
pub mod irc;

pub use config::{BotConfig, ServerConfig};
pub use irc::error::{ParseError, SessionError};
pub use irc::gate::Phase;
pub use irc::handler::{Handler, HandlerRegistry};
pub use irc::message::Message;
pub use irc::pipeline::Bot;
pub use irc::session::{Session, SessionStatus};
