//! Field marshaling error types.

use crate::target::Target;
use crate::value::{TimeFormat, ValueKind};
use thiserror::Error;

/// Errors produced while encoding or decoding a shape's fields.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("{encoder} encoder {op} does not support target {target}, key {key:?}")]
    UnsupportedTarget {
        encoder: &'static str,
        op: &'static str,
        target: Target,
        key: String,
    },

    #[error("{encoder} encoder does not support {shape}, key {key:?}")]
    UnsupportedShape {
        encoder: &'static str,
        shape: &'static str,
        key: String,
    },

    #[error("body target not supported for {method} requests, key {key:?}")]
    BodyNotAllowed { method: String, key: String },

    #[error("request has both a structured {body} body and a payload stream")]
    BodyPayloadConflict { body: &'static str },

    #[error("invalid {format} timestamp {value:?}")]
    InvalidTimestamp { format: TimeFormat, value: String },

    #[error("invalid timestamp {0:?}: not ISO8601, RFC822 or unix epoch seconds")]
    UnknownTimestampLayout(String),

    #[error("invalid path template {template:?}: {reason}")]
    InvalidPath { template: String, reason: String },

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(String),

    #[error("invalid base64 for key {key:?}: {reason}")]
    InvalidBase64 { key: String, reason: String },

    #[error("type mismatch for key {key:?}: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        found: &'static str,
    },

    #[error("invalid {kind} value for key {key:?}: {value:?}")]
    InvalidValue {
        key: String,
        kind: ValueKind,
        value: String,
    },

    #[error("marshal error: {0}")]
    Marshal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Returns whether this error is a target/shape combination the encoder
    /// cannot express. These are schema bugs, never data errors.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnsupportedTarget { .. }
                | ProtocolError::UnsupportedShape { .. }
                | ProtocolError::BodyNotAllowed { .. }
                | ProtocolError::BodyPayloadConflict { .. }
        )
    }

    pub(crate) fn unsupported_target(
        encoder: &'static str,
        op: &'static str,
        target: Target,
        key: &str,
    ) -> Self {
        ProtocolError::UnsupportedTarget {
            encoder,
            op,
            target,
            key: key.to_string(),
        }
    }

    pub(crate) fn unsupported_shape(encoder: &'static str, shape: &'static str, key: &str) -> Self {
        ProtocolError::UnsupportedShape {
            encoder,
            shape,
            key: key.to_string(),
        }
    }
}

/// Terminal error slot shared by every encoder and decoder.
///
/// Only the first recorded error is kept; later ones are dropped so chained
/// `set_*`/`get_*` calls can be checked once at the end.
#[derive(Debug, Default)]
pub struct FirstError(Option<ProtocolError>);

impl FirstError {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self) -> Option<&ProtocolError> {
        self.0.as_ref()
    }

    /// Records `err` unless an earlier error is already held.
    pub fn record(&mut self, err: ProtocolError) {
        if self.0.is_none() {
            self.0 = Some(err);
        }
    }

    pub fn record_result<T>(&mut self, result: Result<T, ProtocolError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.record(e);
                None
            }
        }
    }

    /// Folds a nested scope's slot into this one.
    pub fn merge(&mut self, mut nested: FirstError) {
        if let Some(e) = nested.take() {
            self.record(e);
        }
    }

    pub fn take(&mut self) -> Option<ProtocolError> {
        self.0.take()
    }

    pub fn into_result(mut self) -> Result<(), ProtocolError> {
        match self.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
