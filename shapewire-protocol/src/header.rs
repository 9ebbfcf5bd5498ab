//! HTTP header list and map encoders.

use crate::encode::{FieldMarshaler, ListEncoder, MapEncoder};
use crate::error::{FirstError, ProtocolError};
use crate::value::Value;
use http::header::{HeaderMap, HeaderName, HeaderValue};

/// Validates a header name and value pair.
pub fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ProtocolError> {
    let header_name =
        HeaderName::from_bytes(name.as_bytes()).map_err(|e| ProtocolError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    let header_value = HeaderValue::from_str(value).map_err(|e| ProtocolError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok((header_name, header_value))
}

/// Encodes list elements as repeated values of one header.
pub struct HeaderListEncoder<'a> {
    key: String,
    headers: &'a mut HeaderMap,
    err: FirstError,
}

impl<'a> HeaderListEncoder<'a> {
    pub fn new(key: impl Into<String>, headers: &'a mut HeaderMap) -> Self {
        Self {
            key: key.into(),
            headers,
            err: FirstError::new(),
        }
    }

    pub fn into_error(self) -> FirstError {
        self.err
    }
}

impl ListEncoder for HeaderListEncoder<'_> {
    fn list_add_value(&mut self, v: &Value) {
        if self.err.is_set() {
            return;
        }
        if let Some((name, value)) = self.err.record_result(header_pair(&self.key, &v.marshal_value())) {
            self.headers.append(name, value);
        }
    }

    fn list_add_list(&mut self, _f: &mut dyn FnMut(&mut dyn ListEncoder)) {
        self.err
            .record(ProtocolError::unsupported_shape("header", "list of list", &self.key));
    }

    fn list_add_map(&mut self, _f: &mut dyn FnMut(&mut dyn MapEncoder)) {
        self.err
            .record(ProtocolError::unsupported_shape("header", "list of map", &self.key));
    }

    fn list_add_fields(&mut self, _m: &dyn FieldMarshaler) {
        self.err.record(ProtocolError::unsupported_shape(
            "header",
            "list of structure",
            &self.key,
        ));
    }
}

/// Encodes map entries as headers named `prefix + key`.
pub struct HeaderMapEncoder<'a> {
    prefix: String,
    headers: &'a mut HeaderMap,
    err: FirstError,
}

impl<'a> HeaderMapEncoder<'a> {
    pub fn new(prefix: impl Into<String>, headers: &'a mut HeaderMap) -> Self {
        Self {
            prefix: prefix.into(),
            headers,
            err: FirstError::new(),
        }
    }

    pub fn into_error(self) -> FirstError {
        self.err
    }
}

impl MapEncoder for HeaderMapEncoder<'_> {
    fn map_set_value(&mut self, k: &str, v: &Value) {
        if self.err.is_set() {
            return;
        }
        let key = format!("{}{}", self.prefix, k);
        if let Some((name, value)) = self.err.record_result(header_pair(&key, &v.marshal_value())) {
            self.headers.insert(name, value);
        }
    }

    fn map_set_list(&mut self, k: &str, f: &mut dyn FnMut(&mut dyn ListEncoder)) {
        if self.err.is_set() {
            return;
        }
        let key = format!("{}{}", self.prefix, k);
        let mut nested = HeaderListEncoder::new(key, self.headers);
        f(&mut nested);
        let err = nested.into_error();
        self.err.merge(err);
    }

    fn map_set_map(&mut self, k: &str, _f: &mut dyn FnMut(&mut dyn MapEncoder)) {
        self.err
            .record(ProtocolError::unsupported_shape("header", "map of map", k));
    }

    fn map_set_fields(&mut self, k: &str, _m: &dyn FieldMarshaler) {
        self.err
            .record(ProtocolError::unsupported_shape("header", "map of structure", k));
    }
}
