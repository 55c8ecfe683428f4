//! Reply values and their wire encoding.
//!
//! Only three reply shapes ever leave the server:
//!
//! | Reply | Wire |
//! |---|---|
//! | status | `+OK\r\n` |
//! | error | `-ERR unknown command\r\n` |
//! | missing key | `$-1\r\n` |
//!
//! Requests arrive as arrays of bulk strings and are handled by
//! [`crate::protocol::parser`]; they never become a `RespValue`.

/// Line terminator for every RESP element
pub const CRLF: &[u8] = b"\r\n";

/// First byte of each RESP element type
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+<text>\r\n`; the text must not contain CR or LF
    SimpleString(String),
    /// `-<message>\r\n`
    Error(String),
    /// `$-1\r\n`
    Null,
}

impl RespValue {
    /// ```
    /// use pxkv::protocol::RespValue;
    /// assert_eq!(RespValue::simple_string("teal").serialize(), b"+teal\r\n");
    /// ```
    pub fn simple_string(text: impl Into<String>) -> Self {
        Self::SimpleString(text.into())
    }

    /// ```
    /// use pxkv::protocol::RespValue;
    /// assert_eq!(RespValue::error("ERR boom").serialize(), b"-ERR boom\r\n");
    /// ```
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn null() -> Self {
        Self::Null
    }

    pub fn ok() -> Self {
        Self::simple_string("OK")
    }

    pub fn pong() -> Self {
        Self::simple_string("PONG")
    }

    /// Encodes the reply into a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.serialize_into(&mut out);
        out
    }

    /// Appends the encoded reply to `out`.
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        let (tag, body): (u8, &[u8]) = match self {
            Self::SimpleString(text) => (prefix::SIMPLE_STRING, text.as_bytes()),
            Self::Error(message) => (prefix::ERROR, message.as_bytes()),
            Self::Null => (prefix::BULK_STRING, b"-1"),
        };

        out.push(tag);
        out.extend_from_slice(body);
        out.extend_from_slice(CRLF);
    }

    fn encoded_len(&self) -> usize {
        let body = match self {
            Self::SimpleString(s) | Self::Error(s) => s.len(),
            Self::Null => 2,
        };
        1 + body + CRLF.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(RespValue::ok().serialize(), b"+OK\r\n");
        assert_eq!(RespValue::pong().serialize(), b"+PONG\r\n");
        assert_eq!(
            RespValue::simple_string("hello world").serialize(),
            b"+hello world\r\n"
        );
        assert_eq!(
            RespValue::error("ERR unknown command").serialize(),
            b"-ERR unknown command\r\n"
        );
        assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_empty_simple_string() {
        assert_eq!(RespValue::simple_string("").serialize(), b"+\r\n");
    }

    #[test]
    fn test_serialize_into_appends() {
        let mut out = b"+PONG\r\n".to_vec();
        RespValue::ok().serialize_into(&mut out);
        RespValue::null().serialize_into(&mut out);
        assert_eq!(out, b"+PONG\r\n+OK\r\n$-1\r\n");
    }

    #[test]
    fn test_encoded_len_matches_output() {
        for reply in [
            RespValue::ok(),
            RespValue::error("ERR x"),
            RespValue::null(),
        ] {
            assert_eq!(reply.encoded_len(), reply.serialize().len());
        }
    }
}
