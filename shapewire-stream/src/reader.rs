//! Typed event reader.

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::event::EventUnmarshaler;
use parking_lot::Mutex;
use shapewire_eventstream::{message_types, names, Decoder, HeaderValue, MessageView};
use shapewire_protocol::PayloadUnmarshaler;
use std::io::Read;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Returns the `:event-type` of a message.
pub fn get_event_type<'a>(msg: &'a MessageView<'_>) -> Result<&'a str, StreamError> {
    match msg.headers.get(names::EVENT_TYPE) {
        None => Err(StreamError::MissingEventType),
        Some(HeaderValue::String(s)) => Ok(s.as_str()),
        Some(other) => Err(StreamError::EventTypeNotString(other.header_type())),
    }
}

/// Reads messages from a byte stream and unmarshals each into the event its
/// `:event-type` names.
///
/// `registry` maps an event type name to an empty event value, or fails for
/// names it does not know. Event payloads borrow a buffer that is reused on
/// every read; unmarshalers copy what they keep.
pub struct EventReader<R, F> {
    decoder: Decoder<R>,
    payload_unmarshaler: Box<dyn PayloadUnmarshaler>,
    registry: F,
}

impl<R, F, T> EventReader<R, F>
where
    R: Read,
    F: FnMut(&str) -> Result<T, StreamError>,
    T: EventUnmarshaler,
{
    pub fn new(reader: R, payload_unmarshaler: impl PayloadUnmarshaler + 'static, registry: F) -> Self {
        Self::with_config(reader, payload_unmarshaler, registry, &StreamConfig::default())
    }

    /// Sizes the payload buffer and message logging from `config`.
    pub fn with_config(
        reader: R,
        payload_unmarshaler: impl PayloadUnmarshaler + 'static,
        registry: F,
        config: &StreamConfig,
    ) -> Self {
        let decoder = Decoder::with_capacity(reader, config.read_buffer_size)
            .with_message_logging(config.log_messages);
        Self {
            decoder,
            payload_unmarshaler: Box::new(payload_unmarshaler),
            registry,
        }
    }

    /// Reads the next event. Returns `Ok(None)` at a clean end of stream.
    ///
    /// `error` messages become [`StreamError::Service`] and `exception`
    /// messages become [`StreamError::Exception`]. Every error from this
    /// method leaves the stream unusable.
    pub fn read_event(&mut self) -> Result<Option<T>, StreamError> {
        let Some(msg) = self.decoder.decode()? else {
            return Ok(None);
        };

        match msg.headers.get_str(names::MESSAGE_TYPE) {
            Some(message_types::ERROR) => return Err(service_error(&msg)),
            Some(message_types::EXCEPTION) => return Err(exception(&msg)),
            _ => {}
        }

        let event_type = get_event_type(&msg)?;
        let mut event = (self.registry)(event_type)?;
        event.unmarshal_event(&*self.payload_unmarshaler, &msg)?;
        trace!(event_type, payload_len = msg.payload.len(), "read event");
        Ok(Some(event))
    }

    pub fn into_inner(self) -> R {
        self.decoder.into_inner()
    }
}

fn service_error(msg: &MessageView<'_>) -> StreamError {
    StreamError::Service {
        code: msg.headers.get_str(names::ERROR_CODE).unwrap_or_default().to_string(),
        message: msg
            .headers
            .get_str(names::ERROR_MESSAGE)
            .unwrap_or_default()
            .to_string(),
    }
}

fn exception(msg: &MessageView<'_>) -> StreamError {
    StreamError::Exception {
        exception_type: msg
            .headers
            .get_str(names::EXCEPTION_TYPE)
            .unwrap_or_default()
            .to_string(),
        message: String::from_utf8_lossy(msg.payload).into_owned(),
    }
}

impl<R, F, T> EventReader<R, F>
where
    R: Read + Send + 'static,
    F: FnMut(&str) -> Result<T, StreamError> + Send + 'static,
    T: EventUnmarshaler + Send + 'static,
{
    /// Moves the reader onto a blocking task that forwards events into a
    /// bounded channel.
    ///
    /// The channel closes at end of stream, on the first read error, or when
    /// the returned [`EventStream`] is dropped. A read error is available from
    /// [`EventStream::take_error`] once the channel has closed.
    pub fn into_event_stream(mut self, capacity: usize) -> EventStream<T> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let error = Arc::new(Mutex::new(None));
        let task_error = error.clone();

        let handle = tokio::task::spawn_blocking(move || {
            debug!("event reader task started");
            loop {
                match self.read_event() {
                    Ok(Some(event)) => {
                        if tx.blocking_send(event).is_err() {
                            debug!("event stream receiver dropped");
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("event stream ended");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "event stream read failed");
                        *task_error.lock() = Some(e);
                        break;
                    }
                }
            }
            // tx drops here, after any error is stored.
        });

        EventStream {
            rx,
            error,
            handle: Some(handle),
        }
    }
}

/// Events forwarded from a background [`EventReader`].
pub struct EventStream<T> {
    rx: mpsc::Receiver<T>,
    error: Arc<Mutex<Option<StreamError>>>,
    handle: Option<JoinHandle<()>>,
}

impl<T> EventStream<T> {
    /// Receives the next event, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Takes the error that ended the stream, if any. Only meaningful after
    /// [`EventStream::recv`] has returned `None`.
    pub fn take_error(&self) -> Option<StreamError> {
        self.error.lock().take()
    }

    /// Stops receiving and waits for the reader task to finish. The task ends
    /// once its next read returns.
    pub async fn close(&mut self) -> Option<StreamError> {
        self.rx.close();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "event reader task failed");
            }
        }
        self.take_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::testing::{registry, EventAbc, EventStructured, TestEvent, SAMPLE_PAYLOAD};
    use bytes::Bytes;
    use shapewire_eventstream::{Encoder, Headers, Message, WriteEncoder};
    use shapewire_protocol::JsonPayloadCodec;
    use std::io::Cursor;

    fn stream_of(msgs: &[Message]) -> Cursor<Vec<u8>> {
        let mut enc = WriteEncoder::new(Vec::new());
        for msg in msgs {
            enc.encode(msg).unwrap();
        }
        Cursor::new(enc.into_inner())
    }

    fn message(headers: &[(&str, HeaderValue)], payload: &'static [u8]) -> Message {
        let headers: Headers = headers.iter().cloned().collect();
        Message::new(headers, Bytes::from_static(payload))
    }

    #[test]
    fn test_read_event_abc() {
        let raw = stream_of(&[message(&[(":event-type", "eventABC".into())], b"")]);
        let mut reader = EventReader::new(raw, JsonPayloadCodec, registry);

        let event = reader.read_event().unwrap().unwrap();
        assert_eq!(event, TestEvent::Abc(EventAbc));
        assert!(reader.read_event().unwrap().is_none());
    }

    #[test]
    fn test_read_structured_events() {
        let raw = stream_of(&[
            message(
                &[
                    (":message-type", "event".into()),
                    (":event-type", "eventStructured".into()),
                ],
                SAMPLE_PAYLOAD.as_bytes(),
            ),
            message(&[(":event-type", "eventABC".into())], b""),
        ]);
        let mut reader = EventReader::new(raw, JsonPayloadCodec, registry);

        assert_eq!(
            reader.read_event().unwrap(),
            Some(TestEvent::Structured(EventStructured::sample()))
        );
        assert_eq!(reader.read_event().unwrap(), Some(TestEvent::Abc(EventAbc)));
    }

    #[test]
    fn test_missing_event_type() {
        let raw = stream_of(&[message(&[("other", "x".into())], b"")]);
        let err = EventReader::new(raw, JsonPayloadCodec, registry)
            .read_event()
            .unwrap_err();
        assert!(matches!(err, StreamError::MissingEventType));
        assert!(err.is_framing_error());
    }

    #[test]
    fn test_event_type_not_string() {
        let raw = stream_of(&[message(&[(":event-type", HeaderValue::Int32(7))], b"")]);
        let err = EventReader::new(raw, JsonPayloadCodec, registry)
            .read_event()
            .unwrap_err();
        assert!(matches!(err, StreamError::EventTypeNotString(_)));
        assert!(err.to_string().contains("int32"));
    }

    #[test]
    fn test_unknown_event_type() {
        let raw = stream_of(&[message(&[(":event-type", "nope".into())], b"")]);
        let err = EventReader::new(raw, JsonPayloadCodec, registry)
            .read_event()
            .unwrap_err();
        assert!(matches!(err, StreamError::UnknownEventType(ref t) if t == "nope"));
    }

    #[test]
    fn test_service_error_message() {
        let raw = stream_of(&[message(
            &[
                (":message-type", "error".into()),
                (":error-code", "Throttled".into()),
                (":error-message", "slow down".into()),
            ],
            b"",
        )]);
        let err = EventReader::new(raw, JsonPayloadCodec, registry)
            .read_event()
            .unwrap_err();
        match err {
            StreamError::Service { code, message } => {
                assert_eq!(code, "Throttled");
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_exception_message() {
        let raw = stream_of(&[message(
            &[
                (":message-type", "exception".into()),
                (":exception-type", "BadInput".into()),
            ],
            br#"{"message":"bad"}"#,
        )]);
        let err = EventReader::new(raw, JsonPayloadCodec, registry)
            .read_event()
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::Exception { ref exception_type, ref message }
                if exception_type == "BadInput" && message.contains("bad")
        ));
    }

    #[test]
    fn test_checksum_error_is_distinct() {
        let mut raw = stream_of(&[message(&[(":event-type", "eventABC".into())], b"x")]).into_inner();
        let n = raw.len();
        raw[n - 1] ^= 0xff;
        let err = EventReader::new(Cursor::new(raw), JsonPayloadCodec, registry)
            .read_event()
            .unwrap_err();
        assert!(matches!(err, StreamError::Framing(ref e) if e.is_checksum_error()));
        assert!(!matches!(err, StreamError::MissingEventType));
    }

    #[tokio::test]
    async fn test_event_stream_forwards_until_end() {
        let raw = stream_of(&[
            message(&[(":event-type", "eventABC".into())], b""),
            message(&[(":event-type", "eventABC".into())], b""),
        ]);
        let mut events = EventReader::new(raw, JsonPayloadCodec, registry).into_event_stream(1);

        assert_eq!(events.recv().await, Some(TestEvent::Abc(EventAbc)));
        assert_eq!(events.recv().await, Some(TestEvent::Abc(EventAbc)));
        assert_eq!(events.recv().await, None);
        assert!(events.take_error().is_none());
    }

    #[tokio::test]
    async fn test_event_stream_keeps_error() {
        let raw = stream_of(&[
            message(&[(":event-type", "eventABC".into())], b""),
            message(&[(":event-type", "mystery".into())], b""),
        ]);
        let mut events = EventReader::new(raw, JsonPayloadCodec, registry).into_event_stream(4);

        assert!(events.recv().await.is_some());
        assert!(events.recv().await.is_none());
        assert!(matches!(
            events.take_error(),
            Some(StreamError::UnknownEventType(_))
        ));
    }

    #[tokio::test]
    async fn test_event_stream_close() {
        let raw = stream_of(&[message(&[(":event-type", "eventABC".into())], b"")]);
        let mut events = EventReader::new(raw, JsonPayloadCodec, registry).into_event_stream(1);
        assert!(events.close().await.is_none());
    }
}
