//! RESP Request Frame Reader
//!
//! Clients send every request as an array of bulk strings:
//!
//! ```text
//! *<argc>\r\n$<len>\r\n<token>\r\n$<len>\r\n<token>\r\n...
//! ```
//!
//! The reader never splits on `\r\n` and indexes into the pieces. It reads
//! each length prefix, then takes exactly that many bytes and verifies the
//! terminator, so a token may itself contain `\r\n`.
//!
//! The parser returns either:
//! - `Ok(Some((tokens, consumed)))` - One complete frame, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the frame is incomplete
//! - `Err(ParseError)` - Invalid protocol data
//!
//! so the connection layer can append network reads to a buffer and parse
//! as many frames as are complete.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while decoding a request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// A type prefix other than the one the grammar requires
    #[error("expected '{expected}', got '{found}'")]
    UnexpectedPrefix { expected: char, found: char },

    /// A length or count line that is not a decimal integer
    #[error("invalid length: {0}")]
    InvalidLength(String),

    /// Argument count is negative (null arrays are not requests)
    #[error("invalid multibulk length: {0}")]
    InvalidArrayLength(i64),

    /// Bulk string length is negative (null bulk strings are not arguments)
    #[error("invalid bulk length: {0}")]
    InvalidBulkLength(i64),

    /// Bulk string payload not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    /// The declared size exceeds the configured limits
    #[error("frame too large: {size} (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The buffer ends before the frame does
    #[error("incomplete frame")]
    Incomplete,

    /// The buffer holds more than one request
    #[error("{0} unexpected bytes after frame")]
    TrailingBytes(usize),

    /// `*0\r\n`
    #[error("empty command")]
    EmptyCommand,

    /// A token that is not valid UTF-8
    #[error("invalid UTF-8 in argument: {0}")]
    InvalidUtf8(String),

    /// Too few arguments for the named command
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    /// An option such as `PX` with nothing after it
    #[error("syntax error")]
    MissingOptionValue,
}

impl ParseError {
    /// Returns true if the byte stream can no longer be trusted to be in
    /// sync with frame boundaries, so the connection has to be closed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ParseError::UnexpectedPrefix { .. }
                | ParseError::InvalidLength(_)
                | ParseError::InvalidArrayLength(_)
                | ParseError::InvalidBulkLength(_)
                | ParseError::MissingCrlf
                | ParseError::FrameTooLarge { .. }
                | ParseError::Incomplete
        )
    }
}

impl From<&ParseError> for RespValue {
    fn from(e: &ParseError) -> Self {
        if e.is_fatal() {
            RespValue::error(format!("ERR Protocol error: {}", e))
        } else {
            RespValue::error(format!("ERR {}", e))
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of tokens in a single request
pub const MAX_ARGS: usize = 1024 * 1024;

/// Reader for `*<argc>` arrays of `$<len>` bulk strings.
///
/// # Example
///
/// ```
/// use pxkv::protocol::RespParser;
///
/// let mut parser = RespParser::new();
/// let (tokens, consumed) = parser
///     .parse(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
///     .unwrap()
///     .unwrap();
///
/// assert_eq!(tokens, vec!["GET", "name"]);
/// assert_eq!(consumed, 23);
/// ```
#[derive(Debug)]
pub struct RespParser {
    max_bulk_size: usize,
    max_args: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    /// Creates a parser with the default limits.
    pub fn new() -> Self {
        Self::with_limits(MAX_BULK_SIZE, MAX_ARGS)
    }

    /// Creates a parser with custom size limits.
    pub fn with_limits(max_bulk_size: usize, max_args: usize) -> Self {
        Self {
            max_bulk_size,
            max_args,
        }
    }

    /// Attempts to read one request frame from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        expect_prefix(buf[0], prefix::ARRAY)?;

        let (count, mut consumed) = match read_length(buf, 1)? {
            Some(line) => line,
            None => return Ok(None),
        };

        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        if count > self.max_args {
            return Err(ParseError::FrameTooLarge {
                size: count,
                max: self.max_args,
            });
        }

        // The count is client controlled; don't trust it for the allocation.
        let mut tokens = Vec::with_capacity(count.min(16));

        for _ in 0..count {
            match self.parse_bulk_string(buf, consumed)? {
                Some((token, next)) => {
                    tokens.push(token);
                    consumed = next;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((tokens, consumed)))
    }

    /// Parses `$<length>\r\n<data>\r\n` starting at `pos`, returning the
    /// token and the position just past it.
    fn parse_bulk_string(&self, buf: &[u8], pos: usize) -> ParseResult<Option<(Bytes, usize)>> {
        if pos >= buf.len() {
            return Ok(None);
        }

        expect_prefix(buf[pos], prefix::BULK_STRING)?;

        let (length, data_start) = match read_length(buf, pos + 1)? {
            Some(line) => line,
            None => return Ok(None),
        };

        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > self.max_bulk_size {
            return Err(ParseError::FrameTooLarge {
                size: length,
                max: self.max_bulk_size,
            });
        }

        let data_end = data_start + length;
        if buf.len() < data_end + CRLF.len() {
            return Ok(None);
        }

        if &buf[data_end..data_end + CRLF.len()] != CRLF {
            return Err(ParseError::MissingCrlf);
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
        Ok(Some((data, data_end + CRLF.len())))
    }
}

#[inline]
fn expect_prefix(found: u8, expected: u8) -> ParseResult<()> {
    if found == expected {
        Ok(())
    } else {
        Err(ParseError::UnexpectedPrefix {
            expected: expected as char,
            found: found as char,
        })
    }
}

/// Reads the decimal line that starts at `start` and returns it together
/// with the position just past its CRLF.
fn read_length(buf: &[u8], start: usize) -> ParseResult<Option<(i64, usize)>> {
    let end = match find_crlf(&buf[start..]) {
        Some(pos) => start + pos,
        None => return Ok(None),
    };

    let line = &buf[start..end];
    let n = std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::InvalidLength(String::from_utf8_lossy(line).into_owned()))?;

    Ok(Some((n, end + CRLF.len())))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_frame(buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        RespParser::new().parse(buf)
    }

    #[test]
    fn test_parse_ping() {
        let input = b"*1\r\n$4\r\nPING\r\n";
        let (tokens, consumed) = parse_frame(input).unwrap().unwrap();
        assert_eq!(tokens, vec![Bytes::from("PING")]);
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_set_command() {
        let input = b"*3\r\n$3\r\nSET\r\n$9\r\ncolor:sky\r\n$4\r\nteal\r\n";
        let (tokens, consumed) = parse_frame(input).unwrap().unwrap();
        assert_eq!(tokens, vec!["SET", "color:sky", "teal"]);
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_empty_bulk_string() {
        let input = b"*2\r\n$4\r\nECHO\r\n$0\r\n\r\n";
        let (tokens, _) = parse_frame(input).unwrap().unwrap();
        assert_eq!(tokens, vec!["ECHO", ""]);
    }

    #[test]
    fn test_token_may_contain_crlf() {
        let input = b"*2\r\n$4\r\nECHO\r\n$4\r\na\r\nb\r\n";
        let (tokens, _) = parse_frame(input).unwrap().unwrap();
        assert_eq!(tokens[1], Bytes::from(&b"a\r\nb"[..]));
    }

    #[test]
    fn test_incomplete_frames() {
        assert!(parse_frame(b"").unwrap().is_none());
        assert!(parse_frame(b"*2").unwrap().is_none());
        assert!(parse_frame(b"*2\r\n").unwrap().is_none());
        assert!(parse_frame(b"*2\r\n$3\r\nGET\r\n").unwrap().is_none());
        assert!(parse_frame(b"*2\r\n$3\r\nGET\r\n$4\r\nna").unwrap().is_none());
        assert!(parse_frame(b"*2\r\n$3\r\nGET\r\n$4\r\nname").unwrap().is_none());
    }

    #[test]
    fn test_pipelined_frames_consume_one_at_a_time() {
        let input = b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n";
        let (_, consumed) = parse_frame(input).unwrap().unwrap();
        assert_eq!(consumed, 14);
        let (tokens, consumed2) = parse_frame(&input[consumed..]).unwrap().unwrap();
        assert_eq!(tokens, vec!["PING"]);
        assert_eq!(consumed + consumed2, input.len());
    }

    #[test]
    fn test_rejects_non_array() {
        let result = parse_frame(b"+PING\r\n");
        assert_eq!(
            result,
            Err(ParseError::UnexpectedPrefix {
                expected: '*',
                found: '+'
            })
        );
    }

    #[test]
    fn test_rejects_missing_length_prefix() {
        let result = parse_frame(b"*1\r\nPING\r\n");
        assert!(matches!(
            result,
            Err(ParseError::UnexpectedPrefix {
                expected: '$',
                found: 'P'
            })
        ));
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert!(matches!(
            parse_frame(b"*x\r\n"),
            Err(ParseError::InvalidLength(_))
        ));
        assert!(matches!(
            parse_frame(b"*1\r\n$abc\r\nPING\r\n"),
            Err(ParseError::InvalidLength(_))
        ));
        assert_eq!(
            parse_frame(b"*-1\r\n"),
            Err(ParseError::InvalidArrayLength(-1))
        );
        assert_eq!(
            parse_frame(b"*1\r\n$-1\r\n"),
            Err(ParseError::InvalidBulkLength(-1))
        );
    }

    #[test]
    fn test_rejects_wrong_declared_length() {
        // Declared 3 bytes, sent 4
        let result = parse_frame(b"*1\r\n$3\r\nPING\r\n");
        assert_eq!(result, Err(ParseError::MissingCrlf));
    }

    #[test]
    fn test_empty_array_is_a_frame() {
        let (tokens, consumed) = parse_frame(b"*0\r\n").unwrap().unwrap();
        assert!(tokens.is_empty());
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_limits() {
        let mut parser = RespParser::with_limits(4, 2);
        assert_eq!(
            parser.parse(b"*3\r\n"),
            Err(ParseError::FrameTooLarge { size: 3, max: 2 })
        );
        assert_eq!(
            parser.parse(b"*1\r\n$5\r\n"),
            Err(ParseError::FrameTooLarge { size: 5, max: 4 })
        );
    }

    #[test]
    fn test_error_replies() {
        let fatal = RespValue::from(&ParseError::MissingCrlf);
        assert_eq!(
            fatal,
            RespValue::error("ERR Protocol error: bulk string missing trailing CRLF")
        );

        let arity = RespValue::from(&ParseError::WrongArity("get"));
        assert_eq!(
            arity,
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
    }

    #[test]
    fn test_is_fatal() {
        assert!(ParseError::MissingCrlf.is_fatal());
        assert!(ParseError::InvalidLength("x".into()).is_fatal());
        assert!(!ParseError::WrongArity("set").is_fatal());
        assert!(!ParseError::EmptyCommand.is_fatal());
        assert!(!ParseError::InvalidUtf8("bad".into()).is_fatal());
    }

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"OK\r\nrest"), Some(2));
        assert_eq!(find_crlf(b"OK\r"), None);
        assert_eq!(find_crlf(b""), None);
    }
}
