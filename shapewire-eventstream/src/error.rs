//! EventStream codec error types.

use thiserror::Error;

/// Errors that can occur while framing or parsing EventStream messages.
///
/// Every decode error is fatal to the stream it came from: there is no way to
/// resynchronise on a message boundary once the framing is in doubt.
#[derive(Debug, Error)]
pub enum EventStreamError {
    #[error("prelude checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    PreludeChecksum { expected: u32, actual: u32 },

    #[error("message checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    MessageChecksum { expected: u32, actual: u32 },

    #[error("invalid message length {total}: headers length {headers}")]
    InvalidLength { total: u32, headers: u32 },

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("header block too large: {size} bytes (max {max})")]
    HeadersTooLarge { size: usize, max: usize },

    #[error("invalid header name {name:?}: {reason}")]
    InvalidHeaderName { name: String, reason: &'static str },

    #[error("header {name:?} value too long: {size} bytes (max {max})")]
    HeaderValueTooLong { name: String, size: usize, max: usize },

    #[error("header {name:?} has unknown value type {tag}")]
    UnknownHeaderType { name: String, tag: u8 },

    #[error("header {0:?} appears more than once")]
    DuplicateHeader(String),

    #[error("header block truncated while reading {0}")]
    TruncatedHeaders(&'static str),

    #[error("header {name:?} has an out of range timestamp {millis}")]
    InvalidTimestamp { name: String, millis: i64 },

    #[error("invalid UTF-8 in header {0:?}")]
    InvalidUtf8(String),

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    #[error("unexpected end of stream inside a message")]
    UnexpectedEof,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EventStreamError {
    /// Returns whether this error is a checksum failure.
    pub fn is_checksum_error(&self) -> bool {
        matches!(
            self,
            EventStreamError::PreludeChecksum { .. } | EventStreamError::MessageChecksum { .. }
        )
    }

    /// Returns whether this error means the bytes on the wire are not a valid
    /// message, as opposed to an I/O failure of the underlying transport.
    pub fn is_framing_error(&self) -> bool {
        !matches!(self, EventStreamError::Io(_) | EventStreamError::Json(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_classification() {
        let err = EventStreamError::PreludeChecksum {
            expected: 1,
            actual: 2,
        };
        assert!(err.is_checksum_error());
        assert!(err.is_framing_error());

        let err = EventStreamError::UnknownHeaderType {
            name: "x".into(),
            tag: 42,
        };
        assert!(!err.is_checksum_error());
        assert!(err.is_framing_error());

        let err = EventStreamError::Io(std::io::Error::other("boom"));
        assert!(!err.is_framing_error());
    }

    #[test]
    fn test_error_display_has_context() {
        let err = EventStreamError::MessageChecksum {
            expected: 0xABCD,
            actual: 0x1234,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x0000abcd"));
        assert!(msg.contains("0x00001234"));

        let err = EventStreamError::UnknownHeaderType {
            name: ":event-type".into(),
            tag: 11,
        };
        assert!(err.to_string().contains(":event-type"));
        assert!(err.to_string().contains("11"));
    }
}
