//! Typed wire values.
//!
//! Every value has a canonical text form, used by query strings, headers and
//! XML character data, and a buffer form that the JSON encoder writes raw or
//! quoted depending on the value's type.

use crate::encode::StreamMarshaler;
use crate::error::ProtocolError;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::fmt;

const ISO8601_LAYOUT: &str = "%Y-%m-%dT%H:%M:%SZ";
const RFC822_LAYOUT: &str = "%a, %-d %b %Y %H:%M:%S GMT";
const RFC822_PARSE_LAYOUT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Text layout of a timestamp on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeFormat {
    /// `2006-01-02T15:04:05Z`
    Iso8601,
    /// `Mon, 2 Jan 2006 15:04:05 GMT`
    Rfc822,
    /// Seconds since the unix epoch, fractional when sub-second.
    UnixEpoch,
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeFormat::Iso8601 => write!(f, "ISO8601"),
            TimeFormat::Rfc822 => write!(f, "RFC822"),
            TimeFormat::UnixEpoch => write!(f, "unix epoch"),
        }
    }
}

/// A timestamp paired with the layout it is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeValue {
    pub value: DateTime<Utc>,
    pub format: TimeFormat,
}

impl TimeValue {
    pub fn new(value: DateTime<Utc>, format: TimeFormat) -> Self {
        Self { value, format }
    }

    pub fn iso8601(value: DateTime<Utc>) -> Self {
        Self::new(value, TimeFormat::Iso8601)
    }

    pub fn rfc822(value: DateTime<Utc>) -> Self {
        Self::new(value, TimeFormat::Rfc822)
    }

    pub fn unix(value: DateTime<Utc>) -> Self {
        Self::new(value, TimeFormat::UnixEpoch)
    }

    pub fn format_text(&self) -> String {
        match self.format {
            TimeFormat::Iso8601 => self.value.format(ISO8601_LAYOUT).to_string(),
            TimeFormat::Rfc822 => self.value.format(RFC822_LAYOUT).to_string(),
            TimeFormat::UnixEpoch => {
                let secs = self.value.timestamp_millis() as f64 / 1000.0;
                secs.to_string()
            }
        }
    }

    /// Parses `text` in exactly the given layout.
    pub fn parse(text: &str, format: TimeFormat) -> Result<DateTime<Utc>, ProtocolError> {
        let parsed = match format {
            TimeFormat::Iso8601 => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            TimeFormat::Rfc822 => NaiveDateTime::parse_from_str(text, RFC822_PARSE_LAYOUT)
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive)),
            TimeFormat::UnixEpoch => text
                .parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite())
                .and_then(|secs| Utc.timestamp_millis_opt((secs * 1000.0).round() as i64).single()),
        };
        parsed.ok_or_else(|| ProtocolError::InvalidTimestamp {
            format,
            value: text.to_string(),
        })
    }

    /// Parses `text` in any of the supported layouts.
    pub fn parse_any(text: &str) -> Result<DateTime<Utc>, ProtocolError> {
        [TimeFormat::Iso8601, TimeFormat::Rfc822, TimeFormat::UnixEpoch]
            .into_iter()
            .find_map(|format| Self::parse(text, format).ok())
            .ok_or_else(|| ProtocolError::UnknownTimestampLayout(text.to_string()))
    }
}

/// The type of a value, used by decoders to know what to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Int64,
    Float64,
    Bool,
    Time(TimeFormat),
    Bytes,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::String => write!(f, "string"),
            ValueKind::Int64 => write!(f, "int64"),
            ValueKind::Float64 => write!(f, "float64"),
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Time(format) => write!(f, "{} timestamp", format),
            ValueKind::Bytes => write!(f, "bytes"),
        }
    }
}

/// An immutable, type-tagged scalar or blob.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Time(TimeValue),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::Int64(_) => ValueKind::Int64,
            Value::Float64(_) => ValueKind::Float64,
            Value::Bool(_) => ValueKind::Bool,
            Value::Time(t) => ValueKind::Time(t.format),
            Value::Bytes(_) => ValueKind::Bytes,
        }
    }

    /// Canonical text form. Blobs are base64 encoded.
    pub fn marshal_value(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int64(v) => v.to_string(),
            Value::Float64(v) => format_float(*v),
            Value::Bool(v) => v.to_string(),
            Value::Time(t) => t.format_text(),
            Value::Bytes(b) => base64::engine::general_purpose::STANDARD.encode(b),
        }
    }

    /// Appends the text form to `buf`.
    pub fn marshal_into(&self, buf: &mut Vec<u8>) {
        match self {
            Value::String(s) => buf.extend_from_slice(s.as_bytes()),
            Value::Bytes(b) => {
                let start = buf.len();
                let encoded_len = base64::encoded_len(b.len(), true).unwrap_or(0);
                buf.resize(start + encoded_len, 0);
                let written = base64::engine::general_purpose::STANDARD
                    .encode_slice(b, &mut buf[start..])
                    .unwrap_or(0);
                buf.truncate(start + written);
            }
            other => buf.extend_from_slice(other.marshal_value().as_bytes()),
        }
    }

    /// Whether the JSON encoder must write this value as a quoted string.
    pub fn is_json_quoted(&self) -> bool {
        match self {
            Value::String(_) | Value::Bytes(_) => true,
            Value::Float64(v) => !v.is_finite(),
            Value::Time(t) => t.format != TimeFormat::UnixEpoch,
            Value::Int64(_) | Value::Bool(_) => false,
        }
    }

    /// Parses the text form of a value of the given kind. `key` is only used
    /// for error context.
    pub fn parse(kind: ValueKind, key: &str, text: &str) -> Result<Value, ProtocolError> {
        let invalid = || ProtocolError::InvalidValue {
            key: key.to_string(),
            kind,
            value: text.to_string(),
        };
        match kind {
            ValueKind::String => Ok(Value::String(text.to_string())),
            ValueKind::Int64 => text.parse().map(Value::Int64).map_err(|_| invalid()),
            ValueKind::Float64 => parse_float(text).map(Value::Float64).ok_or_else(invalid),
            ValueKind::Bool => match text {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
            ValueKind::Time(format) => {
                let value = TimeValue::parse(text, format).or_else(|_| TimeValue::parse_any(text))?;
                Ok(Value::Time(TimeValue::new(value, format)))
            }
            ValueKind::Bytes => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map(Value::Bytes)
                .map_err(|e| ProtocolError::InvalidBase64 {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::Bool(_) => "bool",
            Value::Time(_) => "timestamp",
            Value::Bytes(_) => "bytes",
        }
    }
}

fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        v.to_string()
    }
}

pub(crate) fn parse_float(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => text.parse().ok(),
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(v.clone())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<TimeValue> for Value {
    fn from(v: TimeValue) -> Self {
        Value::Time(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

macro_rules! value_try_from {
    ($ty:ty, $variant:ident, $kind:expr) => {
        impl TryFrom<Value> for $ty {
            type Error = ProtocolError;

            fn try_from(v: Value) -> Result<Self, Self::Error> {
                match v {
                    Value::$variant(inner) => Ok(inner.into()),
                    other => Err(ProtocolError::TypeMismatch {
                        key: String::new(),
                        expected: $kind,
                        found: other.type_name(),
                    }),
                }
            }
        }
    };
}

value_try_from!(String, String, ValueKind::String);
value_try_from!(i64, Int64, ValueKind::Int64);
value_try_from!(f64, Float64, ValueKind::Float64);
value_try_from!(bool, Bool, ValueKind::Bool);
value_try_from!(Vec<u8>, Bytes, ValueKind::Bytes);

impl TryFrom<Value> for DateTime<Utc> {
    type Error = ProtocolError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Time(t) => Ok(t.value),
            other => Err(ProtocolError::TypeMismatch {
                key: String::new(),
                expected: ValueKind::Time(TimeFormat::Iso8601),
                found: other.type_name(),
            }),
        }
    }
}

/// Scratch buffer reused across value marshaling calls.
#[derive(Debug, Default)]
pub struct FieldBuffer {
    buf: Vec<u8>,
}

impl FieldBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value's text form. The slice is only valid until the next
    /// call.
    pub fn get_value(&mut self, v: &Value) -> &[u8] {
        self.buf.clear();
        v.marshal_into(&mut self.buf);
        &self.buf
    }
}

/// A stream payload backed by a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringStream(pub String);

impl StreamMarshaler for StringStream {
    fn marshal_stream(&self) -> Result<Bytes, ProtocolError> {
        Ok(Bytes::from(self.0.clone()))
    }
}

/// A stream payload backed by raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesStream(pub Bytes);

impl StreamMarshaler for BytesStream {
    fn marshal_stream(&self) -> Result<Bytes, ProtocolError> {
        Ok(self.0.clone())
    }
}
