//! Command Handler Module
//!
//! Executes decoded commands against the storage engine and builds the
//! reply for each one.
//!
//! | Command | Reply |
//! |---|---|
//! | `PING` | `+PONG` |
//! | `ECHO msg...` | `+msg...` (arguments joined by a space) |
//! | `SET key value [PX ms]` | `+OK` |
//! | `GET key` | `+value`, or `$-1` when absent |
//! | anything else | `-ERR unknown command` |
//!
//! Replies are simple strings, which cannot carry CR or LF. `SET` refuses
//! such a value and `ECHO` refuses such a message, so every request gets
//! exactly one reply line.

use crate::protocol::{Command, CommandKind, RespValue};
use crate::storage::StorageEngine;
use std::sync::Arc;

/// Handles commands by dispatching them to the appropriate handlers.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a command and returns the reply.
    pub fn execute(&self, command: Command) -> RespValue {
        let kind = command.kind();
        let args = command.into_args();

        match kind {
            CommandKind::Ping => self.cmd_ping(),
            CommandKind::Echo => self.cmd_echo(args),
            CommandKind::Set => self.cmd_set(args),
            CommandKind::Get => self.cmd_get(args),
            CommandKind::Unknown => RespValue::error("ERR unknown command"),
        }
    }

    /// PING
    fn cmd_ping(&self) -> RespValue {
        RespValue::pong()
    }

    /// ECHO message [message ...]
    fn cmd_echo(&self, args: Vec<String>) -> RespValue {
        let message = args.join(" ");
        if has_line_break(&message) {
            return RespValue::error("ERR ECHO message must not contain CR or LF");
        }
        RespValue::simple_string(message)
    }

    /// SET key value [PX milliseconds]
    ///
    /// The third argument is the raw `PX` value, empty when there is none.
    fn cmd_set(&self, args: Vec<String>) -> RespValue {
        let mut args = args.into_iter();

        let (key, value) = match (args.next(), args.next()) {
            (Some(key), Some(value)) => (key, value),
            _ => return RespValue::error("ERR wrong number of arguments for 'set' command"),
        };

        if has_line_break(&value) {
            return RespValue::error("ERR SET value must not contain CR or LF");
        }

        let ttl = match args.next().as_deref() {
            None | Some("") => None,
            Some(raw) => match parse_ttl(raw) {
                Ok(ms) => Some(ms),
                Err(reply) => return reply,
            },
        };

        self.storage.set(key, value, ttl);
        RespValue::ok()
    }

    /// GET key
    fn cmd_get(&self, args: Vec<String>) -> RespValue {
        let key = match args.first() {
            Some(key) => key,
            None => return RespValue::error("ERR wrong number of arguments for 'get' command"),
        };

        match self.storage.get(key) {
            Some(value) => RespValue::simple_string(value),
            None => RespValue::null(),
        }
    }
}

/// Parses a `PX` argument. Any `i64` is accepted; a TTL of zero or less
/// stores a key that is expired as soon as the clock moves past it.
fn parse_ttl(raw: &str) -> Result<i64, RespValue> {
    raw.parse::<i64>()
        .map_err(|_| RespValue::error("ERR value is not an integer or out of range"))
}

fn has_line_break(s: &str) -> bool {
    s.bytes().any(|b| b == b'\r' || b == b'\n')
}
