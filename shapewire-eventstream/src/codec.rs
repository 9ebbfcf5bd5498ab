//! Stream encoders and decoders for EventStream messages.

use crate::debug::to_debug_json;
use crate::error::EventStreamError;
use crate::header::Headers;
use crate::message::{Message, MessageView, Prelude, PRELUDE_LEN};
use crate::MESSAGE_CRC_LEN;
use bytes::{Buf, Bytes, BytesMut};
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, warn};

/// Writes whole messages to some destination.
///
/// Wrapping encoders (signing, for one) can add failure modes of their own,
/// so the error type is chosen by the implementation.
pub trait Encoder {
    type Error: From<EventStreamError>;

    fn encode(&mut self, msg: &Message) -> Result<(), Self::Error>;

    /// Ends the stream. Encoders that emit a trailer write it here.
    fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<E: Encoder + ?Sized> Encoder for &mut E {
    type Error = E::Error;

    fn encode(&mut self, msg: &Message) -> Result<(), Self::Error> {
        (**self).encode(msg)
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        (**self).close()
    }
}

impl<E: Encoder + ?Sized> Encoder for Box<E> {
    type Error = E::Error;

    fn encode(&mut self, msg: &Message) -> Result<(), Self::Error> {
        (**self).encode(msg)
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        (**self).close()
    }
}

/// Encodes messages onto an [`std::io::Write`]. Each message is written with a
/// single `write_all`, so messages never interleave on the writer.
pub struct WriteEncoder<W> {
    writer: W,
    scratch: BytesMut,
}

impl<W: Write> WriteEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            scratch: BytesMut::with_capacity(1024),
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Encoder for WriteEncoder<W> {
    type Error = EventStreamError;

    fn encode(&mut self, msg: &Message) -> Result<(), EventStreamError> {
        self.scratch.clear();
        msg.encode_to(&mut self.scratch)?;
        self.writer.write_all(&self.scratch)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Encodes messages into an in-memory buffer.
#[derive(Debug, Default)]
pub struct BufferEncoder {
    buf: BytesMut,
}

impl BufferEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Takes everything encoded so far, leaving the encoder empty.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Encoder for BufferEncoder {
    type Error = EventStreamError;

    fn encode(&mut self, msg: &Message) -> Result<(), EventStreamError> {
        msg.encode_to(&mut self.buf)
    }
}

/// Decodes messages from an [`std::io::Read`].
///
/// The message body is read into a buffer owned by the decoder and reused
/// across calls, so the payload of a returned [`MessageView`] is only valid
/// until the next call to [`Decoder::decode`].
pub struct Decoder<R> {
    reader: R,
    buf: Vec<u8>,
    log_messages: bool,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, 10 * 1024)
    }

    /// Creates a decoder whose payload buffer starts at `capacity` bytes.
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(capacity),
            log_messages: false,
        }
    }

    /// Logs every decoded message as JSON at debug level.
    pub fn with_message_logging(mut self, enabled: bool) -> Self {
        self.log_messages = enabled;
        self
    }

    /// Decodes the next message.
    ///
    /// Returns `Ok(None)` on a clean end of stream at a message boundary. End
    /// of stream inside a message is [`EventStreamError::UnexpectedEof`].
    pub fn decode(&mut self) -> Result<Option<MessageView<'_>>, EventStreamError> {
        let mut prelude_raw = [0u8; PRELUDE_LEN];
        if !read_full_or_eof(&mut self.reader, &mut prelude_raw)? {
            return Ok(None);
        }

        let prelude = Prelude::parse(&prelude_raw).inspect_err(|e| {
            warn!(error = %e, "event stream prelude rejected");
        })?;

        self.buf.clear();
        self.buf.resize(prelude.body_len(), 0);
        read_exact_or_eof(&mut self.reader, &mut self.buf)?;

        let crc_at = self.buf.len() - MESSAGE_CRC_LEN;
        let expected = (&self.buf[crc_at..]).get_u32();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&prelude_raw);
        hasher.update(&self.buf[..crc_at]);
        let actual = hasher.finalize();
        if actual != expected {
            let err = EventStreamError::MessageChecksum { expected, actual };
            warn!(error = %err, "event stream message rejected");
            return Err(err);
        }

        let headers_len = prelude.headers_len as usize;
        let headers = Headers::decode(&self.buf[..headers_len])?;
        let view = MessageView {
            headers,
            payload: &self.buf[headers_len..crc_at],
        };

        if self.log_messages {
            match to_debug_json(&view.headers, view.payload) {
                Ok(json) => debug!(message = %json, "decoded event stream message"),
                Err(e) => debug!(error = %e, "failed to render decoded message"),
            }
        }
        Ok(Some(view))
    }

    /// Decodes the next message into an owned [`Message`].
    pub fn decode_message(&mut self) -> Result<Option<Message>, EventStreamError> {
        Ok(self.decode()?.map(|view| view.to_message()))
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Fills `buf` completely. Returns `Ok(false)` if the reader was already at
/// end of stream.
fn read_full_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool, EventStreamError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(EventStreamError::UnexpectedEof),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<(), EventStreamError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => EventStreamError::UnexpectedEof,
        _ => e.into(),
    })
}

/// Decodes messages from bytes pushed in as they arrive.
pub struct BufferDecoder {
    buffer: BytesMut,
}

impl BufferDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next message from the buffer.
    pub fn decode(&mut self) -> Result<Option<Message>, EventStreamError> {
        Message::decode(&mut self.buffer)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for BufferDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn event(event_type: &str, payload: &'static [u8]) -> Message {
        let mut headers = Headers::new();
        headers.set(":event-type", event_type);
        Message::new(headers, Bytes::from_static(payload))
    }

    fn encode_all(msgs: &[Message]) -> Vec<u8> {
        let mut enc = WriteEncoder::new(Vec::new());
        for msg in msgs {
            enc.encode(msg).unwrap();
        }
        enc.into_inner()
    }

    #[test]
    fn test_write_then_read_stream() {
        let msgs = vec![event("a", b"first"), event("b", b""), event("c", b"third")];
        let raw = encode_all(&msgs);

        let mut dec = Decoder::new(Cursor::new(raw));
        for expected in &msgs {
            let view = dec.decode().unwrap().unwrap();
            assert_eq!(&view.to_message(), expected);
        }
        assert!(dec.decode().unwrap().is_none());
    }

    #[test]
    fn test_payload_buffer_reused() {
        let raw = encode_all(&[event("a", b"0123456789"), event("b", b"xy")]);
        let mut dec = Decoder::with_capacity(Cursor::new(raw), 64);

        let first = dec.decode().unwrap().unwrap();
        assert_eq!(first.payload, b"0123456789");
        let first_ptr = first.payload.as_ptr();
        let headers_len = first.headers.encode().unwrap().len();

        let second = dec.decode().unwrap().unwrap();
        assert_eq!(second.payload, b"xy");
        // Both payloads live in the same allocation at the same offset.
        assert_eq!(
            second.payload.as_ptr(),
            first_ptr.wrapping_sub(headers_len).wrapping_add(second.headers.encode().unwrap().len())
        );
    }

    #[test]
    fn test_truncated_stream() {
        let raw = encode_all(&[event("a", b"payload")]);

        let mut dec = Decoder::new(Cursor::new(raw[..5].to_vec()));
        assert!(matches!(dec.decode(), Err(EventStreamError::UnexpectedEof)));

        let mut dec = Decoder::new(Cursor::new(raw[..raw.len() - 2].to_vec()));
        assert!(matches!(dec.decode(), Err(EventStreamError::UnexpectedEof)));
    }

    #[test]
    fn test_decoder_checksum_failure() {
        let mut raw = encode_all(&[event("a", b"payload")]);
        let n = raw.len();
        raw[n - 6] ^= 0x10;
        let mut dec = Decoder::new(Cursor::new(raw));
        let err = dec.decode().unwrap_err();
        assert!(matches!(err, EventStreamError::MessageChecksum { .. }));
    }

    #[test]
    fn test_decode_message_owned() {
        let raw = encode_all(&[event("a", b"keep me")]);
        let mut dec = Decoder::new(Cursor::new(raw)).with_message_logging(true);
        let msg = dec.decode_message().unwrap().unwrap();
        assert_eq!(&msg.payload[..], b"keep me");
        assert!(dec.decode_message().unwrap().is_none());
    }

    #[test]
    fn test_buffer_encoder_take() {
        let mut enc = BufferEncoder::new();
        enc.encode(&event("a", b"1")).unwrap();
        enc.encode(&event("b", b"2")).unwrap();
        let bytes = enc.take();
        assert!(enc.is_empty());

        let mut dec = BufferDecoder::new();
        dec.extend(&bytes);
        assert_eq!(dec.decode().unwrap().unwrap().headers.get_str(":event-type"), Some("a"));
        assert_eq!(dec.decode().unwrap().unwrap().headers.get_str(":event-type"), Some("b"));
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn test_buffer_decoder_partial() {
        let raw = event("a", b"partial").encode().unwrap();
        let mut dec = BufferDecoder::default();
        dec.extend(&raw[..10]);
        assert!(dec.decode().unwrap().is_none());
        dec.extend(&raw[10..]);
        assert!(dec.decode().unwrap().is_some());
    }

    #[test]
    fn test_encoder_through_mut_ref() {
        fn write_one(mut enc: impl Encoder<Error = EventStreamError>) {
            enc.encode(&Message::default()).unwrap();
        }
        let mut enc = BufferEncoder::new();
        write_one(&mut enc);
        assert_eq!(enc.len(), crate::MIN_MESSAGE_LEN);
    }
}
