//! EventStream message framing.
//!
//! Message format:
//! ```text
//! +----------------+----------------+----------------+
//! | total_len      | headers_len    | prelude_crc    |
//! | u32 (4 bytes)  | u32 (4 bytes)  | u32 (4 bytes)  |
//! +----------------+----------------+----------------+
//! | headers (headers_len bytes)                      |
//! +--------------------------------------------------+
//! | payload (total_len - headers_len - 16 bytes)     |
//! +--------------------------------------------------+
//! | message_crc    |
//! | u32 (4 bytes)  |
//! +----------------+
//! ```
//!
//! All integers are big-endian. Both checksums are CRC32 (IEEE). The prelude
//! checksum covers the first 8 bytes; the message checksum covers everything
//! before it, prelude checksum included.

use crate::error::EventStreamError;
use crate::header::Headers;
use crate::{MAX_HEADERS_LEN, MAX_PAYLOAD_LEN, MESSAGE_CRC_LEN, MIN_MESSAGE_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the fixed message prelude.
pub const PRELUDE_LEN: usize = 12;

/// Parsed and checksum-validated message prelude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Prelude {
    pub total_len: u32,
    pub headers_len: u32,
}

impl Prelude {
    /// Validates the prelude checksum first, then the lengths it declares.
    /// Lengths are untrusted until both checks pass.
    pub fn parse(raw: &[u8]) -> Result<Self, EventStreamError> {
        let mut buf = &raw[..PRELUDE_LEN];
        let total_len = buf.get_u32();
        let headers_len = buf.get_u32();
        let expected = buf.get_u32();

        let actual = crc32fast::hash(&raw[..8]);
        if actual != expected {
            return Err(EventStreamError::PreludeChecksum { expected, actual });
        }

        let prelude = Prelude {
            total_len,
            headers_len,
        };
        prelude.validate()?;
        Ok(prelude)
    }

    fn validate(&self) -> Result<(), EventStreamError> {
        let total = self.total_len as usize;
        let headers = self.headers_len as usize;
        if total < MIN_MESSAGE_LEN || headers > total - MIN_MESSAGE_LEN {
            return Err(EventStreamError::InvalidLength {
                total: self.total_len,
                headers: self.headers_len,
            });
        }
        if headers > MAX_HEADERS_LEN {
            return Err(EventStreamError::HeadersTooLarge {
                size: headers,
                max: MAX_HEADERS_LEN,
            });
        }
        if self.payload_len() > MAX_PAYLOAD_LEN {
            return Err(EventStreamError::PayloadTooLarge {
                size: self.payload_len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(())
    }

    pub fn payload_len(&self) -> usize {
        self.total_len as usize - self.headers_len as usize - MIN_MESSAGE_LEN
    }

    /// Length of the message after the prelude.
    pub fn body_len(&self) -> usize {
        self.total_len as usize - PRELUDE_LEN
    }
}

/// A single EventStream message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub headers: Headers,
    pub payload: Bytes,
}

impl Message {
    pub fn new(headers: Headers, payload: impl Into<Bytes>) -> Self {
        Self {
            headers,
            payload: payload.into(),
        }
    }

    /// Encodes the message into a new buffer.
    pub fn encode(&self) -> Result<BytesMut, EventStreamError> {
        let mut buf = BytesMut::with_capacity(MIN_MESSAGE_LEN + self.payload.len() + 64);
        self.encode_to(&mut buf)?;
        Ok(buf)
    }

    /// Appends the encoded message to `buf`. On error `buf` is left as it was.
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<(), EventStreamError> {
        let start = buf.len();
        let result = self.encode_inner(start, buf);
        if result.is_err() {
            buf.truncate(start);
        }
        result
    }

    fn encode_inner(&self, start: usize, buf: &mut BytesMut) -> Result<(), EventStreamError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(EventStreamError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        buf.put_bytes(0, PRELUDE_LEN);
        self.headers.encode_to(buf)?;
        let headers_len = buf.len() - start - PRELUDE_LEN;
        if headers_len > MAX_HEADERS_LEN {
            return Err(EventStreamError::HeadersTooLarge {
                size: headers_len,
                max: MAX_HEADERS_LEN,
            });
        }
        buf.put_slice(&self.payload);

        let total_len = (headers_len + self.payload.len() + MIN_MESSAGE_LEN) as u32;
        {
            let mut prelude = &mut buf[start..start + PRELUDE_LEN];
            prelude.put_u32(total_len);
            prelude.put_u32(headers_len as u32);
        }
        let prelude_crc = crc32fast::hash(&buf[start..start + 8]);
        buf[start + 8..start + PRELUDE_LEN].copy_from_slice(&prelude_crc.to_be_bytes());

        let message_crc = crc32fast::hash(&buf[start..]);
        buf.put_u32(message_crc);
        Ok(())
    }

    /// Attempts to decode one message from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more data is needed. The prelude checksum is
    /// checked as soon as 12 bytes are available, before waiting on a length
    /// that may be corrupt.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, EventStreamError> {
        if buf.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let prelude = Prelude::parse(&buf[..PRELUDE_LEN])?;
        let total = prelude.total_len as usize;
        if buf.len() < total {
            buf.reserve(total - buf.len());
            return Ok(None);
        }

        let crc_at = total - MESSAGE_CRC_LEN;
        let expected = (&buf[crc_at..total]).get_u32();
        let actual = crc32fast::hash(&buf[..crc_at]);
        if actual != expected {
            return Err(EventStreamError::MessageChecksum { expected, actual });
        }

        let frame = buf.split_to(total).freeze();
        let headers_end = PRELUDE_LEN + prelude.headers_len as usize;
        let headers = Headers::decode(frame.slice(PRELUDE_LEN..headers_end))?;
        let payload = frame.slice(headers_end..crc_at);

        Ok(Some(Message { headers, payload }))
    }

    /// Decodes exactly one message from a complete buffer.
    pub fn decode_exact(bytes: &[u8]) -> Result<Self, EventStreamError> {
        let mut buf = BytesMut::from(bytes);
        let msg = Self::decode(&mut buf)?.ok_or(EventStreamError::UnexpectedEof)?;
        if !buf.is_empty() {
            return Err(EventStreamError::TrailingBytes(buf.len()));
        }
        Ok(msg)
    }

    /// Length of the message on the wire, ignoring encoding errors.
    pub fn encoded_len(&self) -> usize {
        let headers = self.headers.encode().map(|h| h.len()).unwrap_or(0);
        MIN_MESSAGE_LEN + headers + self.payload.len()
    }
}

/// A decoded message whose payload borrows the decoder's buffer.
///
/// The payload is only valid until the next decode call on the same decoder.
/// Use [`MessageView::to_message`] to keep it longer.
#[derive(Debug, PartialEq, Eq)]
pub struct MessageView<'a> {
    pub headers: Headers,
    pub payload: &'a [u8],
}

impl MessageView<'_> {
    pub fn to_message(&self) -> Message {
        Message {
            headers: self.headers.clone(),
            payload: Bytes::copy_from_slice(self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderValue;
    use chrono::DateTime;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn event(event_type: &str, payload: &'static [u8]) -> Message {
        let mut headers = Headers::new();
        headers.set(":event-type", event_type);
        Message::new(headers, Bytes::from_static(payload))
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = event("eventABC", b"{\"a\":1}");
        let mut buf = msg.encode().unwrap();
        let decoded = Message::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, msg);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload_event() {
        let msg = event("eventABC", b"");
        let mut buf = msg.encode().unwrap();
        let decoded = Message::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.headers.len(), 1);
        assert_eq!(decoded.headers.get_str(":event-type"), Some("eventABC"));
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_known_wire_bytes() {
        // Empty message: only the prelude and message checksum.
        let encoded = Message::default().encode().unwrap();
        assert_eq!(encoded.len(), MIN_MESSAGE_LEN);
        assert_eq!(&encoded[..8], &[0, 0, 0, 16, 0, 0, 0, 0]);
        assert_eq!(&encoded[8..12], &0x05c2_48ebu32.to_be_bytes());
        assert_eq!(&encoded[12..], &0x7d98_c8ffu32.to_be_bytes());
    }

    #[test]
    fn test_prelude_checksum_mismatch() {
        let mut buf = event("e", b"data").encode().unwrap();
        buf[8] ^= 0x01;
        let err = Message::decode(&mut buf).unwrap_err();
        assert!(matches!(err, EventStreamError::PreludeChecksum { .. }));
    }

    #[test]
    fn test_message_checksum_mismatch() {
        let mut buf = event("e", b"data").encode().unwrap();
        let len = buf.len();
        buf[len - 5] ^= 0xFF;
        let err = Message::decode(&mut buf).unwrap_err();
        assert!(matches!(err, EventStreamError::MessageChecksum { .. }));
    }

    #[test]
    fn test_corrupt_length_fails_before_waiting() {
        // A corrupted length must not leave the decoder waiting for bytes
        // that will never arrive.
        let mut buf = event("e", b"data").encode().unwrap();
        buf[0] = 0x7f;
        let err = Message::decode(&mut buf).unwrap_err();
        assert!(err.is_checksum_error());
    }

    #[test]
    fn test_incomplete_message() {
        let encoded = event("e", b"partial").encode().unwrap();

        let mut buf = BytesMut::from(&encoded[..8]);
        assert!(Message::decode(&mut buf).unwrap().is_none());

        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        assert!(Message::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), encoded.len() - 1);

        buf.extend_from_slice(&encoded[encoded.len() - 1..]);
        assert!(Message::decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_multiple_messages_in_buffer() {
        let first = event("a", b"1");
        let second = event("b", b"2");

        let mut buf = BytesMut::new();
        first.encode_to(&mut buf).unwrap();
        second.encode_to(&mut buf).unwrap();

        assert_eq!(Message::decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(Message::decode(&mut buf).unwrap().unwrap(), second);
        assert!(Message::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_invalid_declared_length() {
        let mut raw = BytesMut::new();
        raw.put_u32(10);
        raw.put_u32(0);
        raw.put_u32(crc32fast::hash(&[0, 0, 0, 10, 0, 0, 0, 0]));
        let err = Message::decode(&mut raw).unwrap_err();
        assert!(matches!(err, EventStreamError::InvalidLength { total: 10, .. }));
    }

    #[test]
    fn test_payload_too_large() {
        let msg = Message::new(Headers::new(), vec![0u8; MAX_PAYLOAD_LEN + 1]);
        let mut buf = BytesMut::from(&b"keep"[..]);
        let err = msg.encode_to(&mut buf).unwrap_err();
        assert!(matches!(err, EventStreamError::PayloadTooLarge { .. }));
        assert_eq!(&buf[..], b"keep");
    }

    #[test]
    fn test_encode_error_leaves_buffer_untouched() {
        let mut headers = Headers::new();
        headers.set("", true);
        let mut buf = BytesMut::from(&b"prefix"[..]);
        assert!(Message::new(headers, Bytes::new()).encode_to(&mut buf).is_err());
        assert_eq!(&buf[..], b"prefix");
    }

    #[test]
    fn test_decode_exact_rejects_trailing_bytes() {
        let msg = event("e", b"x");
        let mut raw = msg.encode().unwrap();
        assert_eq!(Message::decode_exact(&raw).unwrap(), msg);

        raw.put_u8(0);
        assert!(matches!(
            Message::decode_exact(&raw),
            Err(EventStreamError::TrailingBytes(1))
        ));
        assert!(matches!(
            Message::decode_exact(&raw[..5]),
            Err(EventStreamError::UnexpectedEof)
        ));
    }

    fn header_value() -> impl Strategy<Value = HeaderValue> {
        prop_oneof![
            any::<bool>().prop_map(HeaderValue::Bool),
            any::<i8>().prop_map(HeaderValue::Byte),
            any::<i16>().prop_map(HeaderValue::Int16),
            any::<i32>().prop_map(HeaderValue::Int32),
            any::<i64>().prop_map(HeaderValue::Int64),
            proptest::collection::vec(any::<u8>(), 0..64)
                .prop_map(|v| HeaderValue::Bytes(Bytes::from(v))),
            ".{0,32}".prop_map(HeaderValue::String),
            (-62_135_596_800_000i64..253_402_300_799_000i64).prop_map(|ms| {
                HeaderValue::Timestamp(DateTime::from_timestamp_millis(ms).unwrap())
            }),
            any::<u128>().prop_map(|v| HeaderValue::Uuid(Uuid::from_u128(v))),
        ]
    }

    fn message() -> impl Strategy<Value = Message> {
        (
            proptest::collection::btree_map("[a-z:-]{1,16}", header_value(), 0..8),
            proptest::collection::vec(any::<u8>(), 0..256),
        )
            .prop_map(|(headers, payload)| Message::new(headers.into_iter().collect(), payload))
    }

    proptest! {
        #[test]
        fn test_roundtrip_law(msg in message()) {
            let mut buf = msg.encode().unwrap();
            let decoded = Message::decode(&mut buf).unwrap().unwrap();
            prop_assert_eq!(decoded, msg);
            prop_assert!(buf.is_empty());
        }

        #[test]
        fn test_single_byte_flip_rejected(msg in message(), idx in any::<prop::sample::Index>(), flip in 1u8..=255) {
            let mut buf = msg.encode().unwrap();
            let i = idx.index(buf.len());
            buf[i] ^= flip;
            let err = Message::decode(&mut buf).unwrap_err();
            prop_assert!(err.is_checksum_error(), "byte {} gave {:?}", i, err);
        }
    }
}
