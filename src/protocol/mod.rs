//! RESP Protocol Implementation
//!
//! The subset of the Redis Serialization Protocol this server speaks:
//! requests are arrays of bulk strings, replies are simple strings, errors,
//! or the null bulk string.
//!
//! ## Modules
//!
//! - `types`: The `RespValue` reply type and its serialization
//! - `parser`: Frame reader for incoming request bytes
//! - `command`: Turns a frame into a `Command`
//!
//! ## Example
//!
//! ```
//! use pxkv::protocol::{decode, CommandKind, RespValue};
//!
//! let command = decode(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").unwrap();
//! assert_eq!(command.kind(), CommandKind::Get);
//!
//! let reply = RespValue::simple_string("teal");
//! assert_eq!(reply.serialize(), b"+teal\r\n");
//! ```

pub mod command;
pub mod parser;
pub mod types;

pub use command::{decode, Command, CommandKind};
pub use parser::{ParseError, ParseResult, RespParser};
pub use types::RespValue;
