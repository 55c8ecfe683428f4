//! Request decoding: turns a frame of tokens into a [`Command`].
//!
//! The first token names the command (matched case-insensitively); the
//! remaining tokens become the argument list:
//!
//! - `PING` takes no arguments; extra tokens are ignored.
//! - `ECHO` takes every remaining token.
//! - `SET` takes `key`, `value` and a third argument holding the token that
//!   follows a `PX` option placed right after the value, or `""` when the
//!   key has no expiry.
//! - `GET` takes `key`.
//!
//! Any other name decodes to [`CommandKind::Unknown`] with no arguments.

use crate::protocol::parser::{ParseError, ParseResult, RespParser};
use bytes::Bytes;
use std::fmt;

/// The commands the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Ping,
    Echo,
    Set,
    Get,
    Unknown,
}

impl CommandKind {
    /// Case-insensitive lookup of a command name.
    pub fn from_name(name: &[u8]) -> Self {
        if name.eq_ignore_ascii_case(b"PING") {
            CommandKind::Ping
        } else if name.eq_ignore_ascii_case(b"ECHO") {
            CommandKind::Echo
        } else if name.eq_ignore_ascii_case(b"SET") {
            CommandKind::Set
        } else if name.eq_ignore_ascii_case(b"GET") {
            CommandKind::Get
        } else {
            CommandKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Ping => "PING",
            CommandKind::Echo => "ECHO",
            CommandKind::Set => "SET",
            CommandKind::Get => "GET",
            CommandKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    args: Vec<String>,
}

impl Command {
    pub fn new(kind: CommandKind, args: Vec<String>) -> Self {
        Self { kind, args }
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }

    /// Builds a command from the tokens of one request frame.
    pub fn from_frame(tokens: Vec<Bytes>) -> ParseResult<Self> {
        let name = tokens.first().ok_or(ParseError::EmptyCommand)?;
        let kind = CommandKind::from_name(name);

        let args = match kind {
            CommandKind::Ping | CommandKind::Unknown => Vec::new(),
            CommandKind::Echo => tokens[1..]
                .iter()
                .map(token_to_string)
                .collect::<ParseResult<Vec<_>>>()?,
            CommandKind::Set => {
                if tokens.len() < 3 {
                    return Err(ParseError::WrongArity("set"));
                }

                let key = token_to_string(&tokens[1])?;
                let value = token_to_string(&tokens[2])?;

                // Only `PX <ms>` directly after the value is recognised.
                let ttl = match tokens.get(3) {
                    Some(opt) if opt.eq_ignore_ascii_case(b"PX") => {
                        let ms = tokens.get(4).ok_or(ParseError::MissingOptionValue)?;
                        token_to_string(ms)?
                    }
                    _ => String::new(),
                };

                vec![key, value, ttl]
            }
            CommandKind::Get => {
                let key = tokens.get(1).ok_or(ParseError::WrongArity("get"))?;
                vec![token_to_string(key)?]
            }
        };

        Ok(Self { kind, args })
    }
}

fn token_to_string(token: &Bytes) -> ParseResult<String> {
    std::str::from_utf8(token)
        .map(str::to_owned)
        .map_err(|e| ParseError::InvalidUtf8(e.to_string()))
}

/// Decodes a buffer holding exactly one request.
///
/// This is the single-buffer entry point; a request split over several
/// reads yields [`ParseError::Incomplete`] and a buffer holding more than
/// one request yields [`ParseError::TrailingBytes`]. The connection layer
/// uses [`RespParser`] directly to handle both cases.
///
/// # Example
///
/// ```
/// use pxkv::protocol::{decode, CommandKind};
///
/// let cmd = decode(b"*2\r\n$4\r\nECHO\r\n$5\r\nhello\r\n").unwrap();
/// assert_eq!(cmd.kind(), CommandKind::Echo);
/// assert_eq!(cmd.args(), ["hello"]);
/// ```
pub fn decode(buf: &[u8]) -> ParseResult<Command> {
    match RespParser::new().parse(buf)? {
        Some((tokens, consumed)) if consumed == buf.len() => Command::from_frame(tokens),
        Some((_, consumed)) => Err(ParseError::TrailingBytes(buf.len() - consumed)),
        None => Err(ParseError::Incomplete),
    }
}
