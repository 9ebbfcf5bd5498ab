//! Event stream error types.

use shapewire_eventstream::header::HeaderType;
use shapewire_eventstream::EventStreamError;
use shapewire_protocol::ProtocolError;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced while reading or writing typed events.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("event type header :event-type not present")]
    MissingEventType,

    #[error("event type header :event-type is a {0} value, not a string")]
    EventTypeNotString(HeaderType),

    #[error("unknown event type {0:?}")]
    UnknownEventType(String),

    #[error("service error {code}: {message}")]
    Service { code: String, message: String },

    #[error("service exception {exception_type}: {message}")]
    Exception {
        exception_type: String,
        message: String,
    },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("stream closed, unable to send event")]
    Closed,

    #[error("send cancelled")]
    Cancelled,

    #[error("event stream framing error: {0}")]
    Framing(#[from] EventStreamError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The write error that poisoned a stream writer. Shared because the
    /// failing send and [`crate::StreamWriter::err`] both report it.
    #[error(transparent)]
    Write(Arc<StreamError>),
}

impl StreamError {
    /// Returns whether the bytes on the wire could not be trusted. The stream
    /// must be closed; nothing past this point is readable.
    pub fn is_framing_error(&self) -> bool {
        match self {
            StreamError::MissingEventType | StreamError::EventTypeNotString(_) => true,
            StreamError::Framing(e) => e.is_framing_error(),
            StreamError::Write(e) => e.is_framing_error(),
            _ => false,
        }
    }

    /// Returns whether the stream stopped because the caller or the peer went
    /// away rather than because of bad data.
    pub fn is_transport_error(&self) -> bool {
        match self {
            StreamError::Closed | StreamError::Cancelled => true,
            StreamError::Framing(e) => !e.is_framing_error(),
            StreamError::Write(e) => e.is_transport_error(),
            _ => false,
        }
    }
}
