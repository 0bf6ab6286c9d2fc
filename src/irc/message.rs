//! Protocol line model and grammar.
//!
//! A [`Message`] is one protocol line, either parsed from the wire or built by
//! the application for sending. The grammar is deliberately minimal:
//!
//! ```text
//! :<prefix> <command> <channel> <arg> <arg> ...   (line from a user or server)
//! <command> <arg> <arg> ...                       (line from the server itself)
//! ```
//!
//! Fields are whitespace-delimited; no trailing-parameter handling is done, so
//! `:hello world` yields the two arguments `:hello` and `world`.

use std::fmt;

use crate::irc::error::ParseError;

/// Leading character marking a line that carries an origin prefix.
pub const PREFIX_SIGIL: char = ':';

/// Separates the nickname from the `user@host` part of a prefix.
pub const NICK_SEPARATOR: char = '!';

/// One protocol line. Empty strings stand for "absent".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// The line exactly as received. Never set on outbound messages.
    pub raw: String,
    /// Origin indicator including the sigil, e.g. `:nick!user@host`.
    pub prefix: String,
    /// Short origin name derived from `prefix`.
    pub nick: String,
    pub command: String,
    pub channel: String,
    pub args: Vec<String>,
}

impl Message {
    /// Parse one line (without its terminator).
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            return Err(ParseError::Empty);
        }

        if !line.starts_with(PREFIX_SIGIL) {
            return Ok(Self {
                raw: line.to_string(),
                command: fields[0].to_string(),
                args: to_strings(&fields[1..]),
                ..Self::default()
            });
        }

        let prefix = fields[0];
        let command = fields.get(1).copied().ok_or_else(|| ParseError::MissingCommand {
            line: line.to_string(),
        })?;
        let channel = fields.get(2).copied().ok_or_else(|| ParseError::MissingArgument {
            line: line.to_string(),
        })?;

        Ok(Self {
            raw: line.to_string(),
            prefix: prefix.to_string(),
            nick: nick_from_prefix(prefix).to_string(),
            command: command.to_string(),
            channel: channel
                .strip_prefix(PREFIX_SIGIL)
                .unwrap_or(channel)
                .to_string(),
            args: to_strings(&fields[3..]),
        })
    }

    /// Build an outbound message.
    pub fn new(command: &str, channel: &str, args: Vec<String>) -> Self {
        Self {
            command: command.to_string(),
            channel: channel.to_string(),
            args,
            ..Self::default()
        }
    }

    /// `PRIVMSG` addressed to `target`, with `text` sent as a trailing parameter.
    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", target, vec![format!("{PREFIX_SIGIL}{text}")])
    }

    /// Wire form, without the line terminator.
    ///
    /// Always `COMMAND CHANNEL ARGS`; an empty channel leaves a double space.
    /// Line breaks inside any field become spaces.
    pub fn to_wire(&self) -> String {
        single_line(format!(
            "{} {} {}",
            self.command,
            self.channel,
            self.args.join(" ")
        ))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Nickname part of a prefix such as `:nick!user@host`.
///
/// A separator at index 0 or 1 leaves nothing usable between the sigil and
/// the separator, so the result is empty.
pub fn nick_from_prefix(prefix: &str) -> &str {
    match prefix.find(NICK_SEPARATOR) {
        Some(i) if i > 1 => prefix.get(1..i).unwrap_or(""),
        _ => "",
    }
}

/// Replace CR and LF with spaces so the text cannot end the line early.
pub(crate) fn single_line(mut line: String) -> String {
    if line.contains(['\r', '\n']) {
        line = line.replace(['\r', '\n'], " ");
    }
    line
}

fn to_strings(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_user_privmsg() {
        let msg = Message::parse(":nick!user@host PRIVMSG #chan :hello world").unwrap();
        assert_eq!(msg.raw, ":nick!user@host PRIVMSG #chan :hello world");
        assert_eq!(msg.prefix, ":nick!user@host");
        assert_eq!(msg.nick, "nick");
        assert_eq!(msg.command, "PRIVMSG");
        // Only the prefix sigil is stripped; the channel marker stays.
        assert_eq!(msg.channel, "#chan");
        assert_eq!(msg.args, args(&[":hello", "world"]));
    }

    #[test]
    fn test_parse_strips_sigil_from_channel_field() {
        let msg = Message::parse(":nick!user@host JOIN :#rust").unwrap();
        assert_eq!(msg.command, "JOIN");
        assert_eq!(msg.channel, "#rust");
        assert!(msg.args.is_empty());

        // Only one sigil is removed.
        let msg = Message::parse(":srv NOTICE ::x").unwrap();
        assert_eq!(msg.channel, ":x");
    }

    #[test]
    fn test_parse_server_line() {
        let msg = Message::parse("PING :server.example").unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.args, args(&[":server.example"]));
        assert!(msg.prefix.is_empty());
        assert!(msg.nick.is_empty());
        assert!(msg.channel.is_empty());
    }

    #[test]
    fn test_parse_bare_command() {
        let msg = Message::parse("PING").unwrap();
        assert_eq!(msg.command, "PING");
        assert!(msg.args.is_empty());
    }

    #[test]
    fn test_parse_server_prefix_without_nick() {
        let msg = Message::parse(":irc.example.net MODE bot +i").unwrap();
        assert_eq!(msg.prefix, ":irc.example.net");
        assert_eq!(msg.nick, "");
        assert_eq!(msg.command, "MODE");
        assert_eq!(msg.channel, "bot");
        assert_eq!(msg.args, args(&["+i"]));
    }

    #[test]
    fn test_nick_separator_position() {
        assert_eq!(nick_from_prefix(":!user@host"), "");
        assert_eq!(nick_from_prefix("!a"), "");
        assert_eq!(nick_from_prefix(":a!user@host"), "a");
        assert_eq!(nick_from_prefix(":nick!user@host"), "nick");
        assert_eq!(nick_from_prefix(":nohost"), "");
        // No sigil and a multibyte first character.
        assert_eq!(nick_from_prefix("é!x"), "");
        assert_eq!(nick_from_prefix("éa!x"), "");
    }

    #[test]
    fn test_parse_extra_whitespace() {
        let msg = Message::parse(":n!u@h   PRIVMSG\t#c   a  b").unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.channel, "#c");
        assert_eq!(msg.args, args(&["a", "b"]));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Message::parse(""), Err(ParseError::Empty));
        assert_eq!(Message::parse("   "), Err(ParseError::Empty));
        assert!(matches!(
            Message::parse(":lonely"),
            Err(ParseError::MissingCommand { .. })
        ));
        assert!(matches!(
            Message::parse(":nick!user@host QUIT"),
            Err(ParseError::MissingArgument { .. })
        ));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let line = ":a!b@c KICK #chan victim :bye";
        assert_eq!(Message::parse(line), Message::parse(line));
    }

    #[test]
    fn test_to_wire() {
        let msg = Message::new("PRIVMSG", "#chan", args(&["hello", "there"]));
        assert_eq!(msg.to_wire(), "PRIVMSG #chan hello there");
        assert_eq!(msg.to_string(), "PRIVMSG #chan hello there");

        // Empty channel keeps its slot.
        let msg = Message::new("PRIVMSG", "", args(&["hi"]));
        assert_eq!(msg.to_wire(), "PRIVMSG  hi");
    }

    #[test]
    fn test_to_wire_keeps_one_line() {
        let msg = Message::new("PRIVMSG", "", args(&["hi\r\nJOIN #evil"]));
        assert_eq!(msg.to_wire(), "PRIVMSG  hi  JOIN #evil");

        let msg = Message::privmsg("#c\n", "a\rb");
        assert_eq!(msg.to_wire(), "PRIVMSG #c  :a b");
    }

    #[test]
    fn test_privmsg_builder() {
        let msg = Message::privmsg("#rust", "hello world");
        assert_eq!(msg.to_wire(), "PRIVMSG #rust :hello world");
        assert!(msg.raw.is_empty());
    }
}
