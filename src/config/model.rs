//! Configuration data model.
//!
//! All structs derive `Serialize`/`Deserialize` for TOML persistence.
//! Missing fields fall back to defaults so a minimal file only needs a host.

use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::nickname::generate_nickname;

/// Root bot configuration: identity, server and channels to join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_nickname")]
    pub nick: String,
    /// Username; falls back to `nick` when left empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// Joined in this order once the server accepts registration.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            nick: default_nickname(),
            user: String::new(),
            channels: Vec::new(),
            server: ServerConfig::default(),
        }
    }
}

impl BotConfig {
    pub fn user(&self) -> &str {
        if self.user.is_empty() {
            &self.nick
        } else {
            &self.user
        }
    }

    /// Reject values the server would refuse or that would corrupt the
    /// handshake lines.
    pub fn validate(&self) -> Result<()> {
        if self.nick.is_empty() {
            bail!("nick must not be empty");
        }
        if self.nick.contains(char::is_whitespace) {
            bail!("nick {:?} contains whitespace", self.nick);
        }
        if self.user.contains(char::is_whitespace) {
            bail!("user {:?} contains whitespace", self.user);
        }
        if self.server.host.is_empty() {
            bail!("server host must not be empty");
        }
        if self.server.port == 0 {
            bail!("server port must not be 0");
        }
        if let Some(ch) = self
            .channels
            .iter()
            .find(|c| c.is_empty() || c.contains(char::is_whitespace))
        {
            bail!("invalid channel name {:?}", ch);
        }
        if self.server.client_cert.is_some() != self.server.client_key.is_some() {
            bail!("client_cert and client_key must be set together");
        }
        Ok(())
    }
}

/// Renders the layout shown by the control panel:
/// `server`, `port` and `ssl` lines, then the channel list if any.
impl fmt::Display for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "server: {}", self.server.host)?;
        writeln!(f, "port: {}", self.server.port)?;
        writeln!(f, "ssl: {}", self.server.tls)?;
        if !self.channels.is_empty() {
            write!(f, "channels: ")?;
            for channel in &self.channels {
                write!(f, "{} ", channel)?;
            }
        }
        Ok(())
    }
}

/// Connection settings for the IRC server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub tls: bool,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// PEM client certificate presented during the TLS handshake.
    #[serde(default)]
    pub client_cert: Option<PathBuf>,
    #[serde(default)]
    pub client_key: Option<PathBuf>,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: true,
            accept_invalid_certs: false,
            client_cert: None,
            client_key: None,
        }
    }
}

fn default_nickname() -> String {
    generate_nickname()
}
fn default_host() -> String {
    "irc.libera.chat".to_string()
}
fn default_port() -> u16 {
    6697
}
fn default_true() -> bool {
    true
}
