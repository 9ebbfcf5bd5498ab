//! # shapewire-eventstream
//!
//! Binary EventStream message codec.
//!
//! This crate provides:
//! - Length-prefixed message framing with CRC32 prelude and message checksums
//! - Typed message headers (bool, integers, bytes, string, timestamp, uuid)
//! - Incremental decoding from partially buffered input
//! - `Read`/`Write` driven encoders and decoders with payload buffer reuse
//! - A JSON debug view of decoded messages

pub mod codec;
pub mod debug;
pub mod error;
pub mod header;
pub mod message;

pub use codec::{BufferDecoder, BufferEncoder, Decoder, Encoder, WriteEncoder};
pub use debug::to_debug_json;
pub use error::EventStreamError;
pub use header::{Header, HeaderType, HeaderValue, Headers};
pub use message::{Message, MessageView, PRELUDE_LEN};

/// Size of the trailing message checksum.
pub const MESSAGE_CRC_LEN: usize = 4;

/// Smallest valid message: prelude plus message checksum, no headers or payload.
pub const MIN_MESSAGE_LEN: usize = PRELUDE_LEN + MESSAGE_CRC_LEN;

/// Maximum payload size (16 MiB).
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Maximum encoded header block size (128 KiB).
pub const MAX_HEADERS_LEN: usize = 128 * 1024;

/// Maximum header name length in bytes.
pub const MAX_HEADER_NAME_LEN: usize = 255;

/// Maximum length of a string or bytes header value.
pub const MAX_HEADER_VALUE_LEN: usize = u16::MAX as usize;

/// Reserved control header names.
pub mod names {
    pub const EVENT_TYPE: &str = ":event-type";
    pub const MESSAGE_TYPE: &str = ":message-type";
    pub const EXCEPTION_TYPE: &str = ":exception-type";
    pub const ERROR_CODE: &str = ":error-code";
    pub const ERROR_MESSAGE: &str = ":error-message";
    pub const CONTENT_TYPE: &str = ":content-type";
    pub const DATE: &str = ":date";
    pub const CHUNK_SIGNATURE: &str = ":chunk-signature";
}

/// Values of the `:message-type` header.
pub mod message_types {
    pub const EVENT: &str = "event";
    pub const EXCEPTION: &str = "exception";
    pub const ERROR: &str = "error";
}
