//! Typed message headers.
//!
//! Each header is encoded as:
//!
//! ```text
//! +----------+-----------+--------+---------------------+
//! | name_len | name      | type   | value               |
//! | 1 byte   | utf-8     | 1 byte | depends on the type |
//! +----------+-----------+--------+---------------------+
//! ```
//!
//! Bytes and string values carry a 2-byte length prefix. Timestamps are
//! milliseconds since the Unix epoch. All integers are big-endian.

use crate::error::EventStreamError;
use crate::{MAX_HEADER_NAME_LEN, MAX_HEADER_VALUE_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Wire type tag of a header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeaderType {
    BoolTrue = 0,
    BoolFalse = 1,
    Byte = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    Bytes = 6,
    String = 7,
    Timestamp = 8,
    Uuid = 9,
}

impl HeaderType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => HeaderType::BoolTrue,
            1 => HeaderType::BoolFalse,
            2 => HeaderType::Byte,
            3 => HeaderType::Int16,
            4 => HeaderType::Int32,
            5 => HeaderType::Int64,
            6 => HeaderType::Bytes,
            7 => HeaderType::String,
            8 => HeaderType::Timestamp,
            9 => HeaderType::Uuid,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HeaderType::BoolTrue | HeaderType::BoolFalse => "bool",
            HeaderType::Byte => "byte",
            HeaderType::Int16 => "int16",
            HeaderType::Int32 => "int32",
            HeaderType::Int64 => "int64",
            HeaderType::Bytes => "bytes",
            HeaderType::String => "string",
            HeaderType::Timestamp => "timestamp",
            HeaderType::Uuid => "uuid",
        }
    }
}

impl fmt::Display for HeaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Bytes(Bytes),
    String(String),
    /// Millisecond precision on the wire; finer precision is truncated.
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl HeaderValue {
    pub fn header_type(&self) -> HeaderType {
        match self {
            HeaderValue::Bool(true) => HeaderType::BoolTrue,
            HeaderValue::Bool(false) => HeaderType::BoolFalse,
            HeaderValue::Byte(_) => HeaderType::Byte,
            HeaderValue::Int16(_) => HeaderType::Int16,
            HeaderValue::Int32(_) => HeaderType::Int32,
            HeaderValue::Int64(_) => HeaderType::Int64,
            HeaderValue::Bytes(_) => HeaderType::Bytes,
            HeaderValue::String(_) => HeaderType::String,
            HeaderValue::Timestamp(_) => HeaderType::Timestamp,
            HeaderValue::Uuid(_) => HeaderType::Uuid,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HeaderValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            HeaderValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    fn encode_to(&self, name: &str, buf: &mut BytesMut) -> Result<(), EventStreamError> {
        buf.put_u8(self.header_type() as u8);
        match self {
            HeaderValue::Bool(_) => {}
            HeaderValue::Byte(v) => buf.put_i8(*v),
            HeaderValue::Int16(v) => buf.put_i16(*v),
            HeaderValue::Int32(v) => buf.put_i32(*v),
            HeaderValue::Int64(v) => buf.put_i64(*v),
            HeaderValue::Bytes(v) => put_len_prefixed(name, v, buf)?,
            HeaderValue::String(v) => put_len_prefixed(name, v.as_bytes(), buf)?,
            HeaderValue::Timestamp(v) => buf.put_i64(v.timestamp_millis()),
            HeaderValue::Uuid(v) => buf.put_slice(v.as_bytes()),
        }
        Ok(())
    }

    fn decode_from(name: &str, buf: &mut impl Buf) -> Result<Self, EventStreamError> {
        let tag = take_u8(buf, "value type")?;
        let Some(header_type) = HeaderType::from_tag(tag) else {
            return Err(EventStreamError::UnknownHeaderType {
                name: name.to_string(),
                tag,
            });
        };

        let value = match header_type {
            HeaderType::BoolTrue => HeaderValue::Bool(true),
            HeaderType::BoolFalse => HeaderValue::Bool(false),
            HeaderType::Byte => HeaderValue::Byte(take_u8(buf, "byte value")? as i8),
            HeaderType::Int16 => {
                ensure(&*buf, 2, "int16 value")?;
                HeaderValue::Int16(buf.get_i16())
            }
            HeaderType::Int32 => {
                ensure(&*buf, 4, "int32 value")?;
                HeaderValue::Int32(buf.get_i32())
            }
            HeaderType::Int64 => {
                ensure(&*buf, 8, "int64 value")?;
                HeaderValue::Int64(buf.get_i64())
            }
            HeaderType::Bytes => HeaderValue::Bytes(take_len_prefixed(buf)?),
            HeaderType::String => {
                let raw = take_len_prefixed(buf)?;
                let s = std::str::from_utf8(&raw)
                    .map_err(|_| EventStreamError::InvalidUtf8(name.to_string()))?;
                HeaderValue::String(s.to_string())
            }
            HeaderType::Timestamp => {
                ensure(&*buf, 8, "timestamp value")?;
                let millis = buf.get_i64();
                let ts = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                    EventStreamError::InvalidTimestamp {
                        name: name.to_string(),
                        millis,
                    }
                })?;
                HeaderValue::Timestamp(ts)
            }
            HeaderType::Uuid => {
                ensure(&*buf, 16, "uuid value")?;
                let mut raw = [0u8; 16];
                buf.copy_to_slice(&mut raw);
                HeaderValue::Uuid(Uuid::from_bytes(raw))
            }
        };
        Ok(value)
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Bool(v) => write!(f, "{v}"),
            HeaderValue::Byte(v) => write!(f, "{v}"),
            HeaderValue::Int16(v) => write!(f, "{v}"),
            HeaderValue::Int32(v) => write!(f, "{v}"),
            HeaderValue::Int64(v) => write!(f, "{v}"),
            HeaderValue::Bytes(v) => f.write_str(&hex::encode(v)),
            HeaderValue::String(v) => f.write_str(v),
            HeaderValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            HeaderValue::Uuid(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::String(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::String(v)
    }
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        HeaderValue::Bool(v)
    }
}

impl From<i32> for HeaderValue {
    fn from(v: i32) -> Self {
        HeaderValue::Int32(v)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Int64(v)
    }
}

impl From<Bytes> for HeaderValue {
    fn from(v: Bytes) -> Self {
        HeaderValue::Bytes(v)
    }
}

impl From<DateTime<Utc>> for HeaderValue {
    fn from(v: DateTime<Utc>) -> Self {
        HeaderValue::Timestamp(v)
    }
}

impl From<Uuid> for HeaderValue {
    fn from(v: Uuid) -> Self {
        HeaderValue::Uuid(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: HeaderValue,
}

/// Ordered message headers. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Sets a header, replacing an existing value in place so the original
    /// position is kept.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|h| h.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(Header { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.0.iter().find(|h| h.name == name).map(|h| &h.value)
    }

    /// Returns the header's value if it is a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(HeaderValue::as_str)
    }

    /// Removes a header, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        let idx = self.0.iter().position(|h| h.name == name)?;
        Some(self.0.remove(idx).value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends the encoded header block to `buf`.
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<(), EventStreamError> {
        for header in &self.0 {
            let name = header.name.as_bytes();
            if name.is_empty() {
                return Err(EventStreamError::InvalidHeaderName {
                    name: String::new(),
                    reason: "empty",
                });
            }
            if name.len() > MAX_HEADER_NAME_LEN {
                return Err(EventStreamError::InvalidHeaderName {
                    name: header.name.clone(),
                    reason: "longer than 255 bytes",
                });
            }
            buf.put_u8(name.len() as u8);
            buf.put_slice(name);
            header.value.encode_to(&header.name, buf)?;
        }
        Ok(())
    }

    /// Encodes the header block on its own, as used for signature input.
    pub fn encode(&self) -> Result<Bytes, EventStreamError> {
        let mut buf = BytesMut::new();
        self.encode_to(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes a complete header block.
    pub fn decode(mut buf: impl Buf) -> Result<Self, EventStreamError> {
        let mut headers = Headers::new();
        while buf.has_remaining() {
            let name_len = take_u8(&mut buf, "name length")? as usize;
            ensure(&buf, name_len, "name")?;
            let raw = buf.copy_to_bytes(name_len);
            let name = std::str::from_utf8(&raw)
                .map_err(|_| EventStreamError::InvalidUtf8(String::from_utf8_lossy(&raw).into()))?
                .to_string();
            let value = HeaderValue::decode_from(&name, &mut buf)?;
            if headers.get(&name).is_some() {
                return Err(EventStreamError::DuplicateHeader(name));
            }
            headers.0.push(Header { name, value });
        }
        Ok(headers)
    }
}

impl<N: Into<String>, V: Into<HeaderValue>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn put_len_prefixed(name: &str, value: &[u8], buf: &mut BytesMut) -> Result<(), EventStreamError> {
    if value.len() > MAX_HEADER_VALUE_LEN {
        return Err(EventStreamError::HeaderValueTooLong {
            name: name.to_string(),
            size: value.len(),
            max: MAX_HEADER_VALUE_LEN,
        });
    }
    buf.put_u16(value.len() as u16);
    buf.put_slice(value);
    Ok(())
}

fn ensure(buf: &impl Buf, n: usize, what: &'static str) -> Result<(), EventStreamError> {
    if buf.remaining() < n {
        return Err(EventStreamError::TruncatedHeaders(what));
    }
    Ok(())
}

fn take_u8(buf: &mut impl Buf, what: &'static str) -> Result<u8, EventStreamError> {
    ensure(&*buf, 1, what)?;
    Ok(buf.get_u8())
}

fn take_len_prefixed(buf: &mut impl Buf) -> Result<Bytes, EventStreamError> {
    ensure(&*buf, 2, "value length")?;
    let len = buf.get_u16() as usize;
    ensure(&*buf, len, "value")?;
    Ok(buf.copy_to_bytes(len))
}
