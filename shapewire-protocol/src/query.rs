//! Query string building.
//!
//! [`QueryValues`] is an ordered multimap rendered as
//! `application/x-www-form-urlencoded`. The list and map encoders here are
//! shared by the REST encoder; [`QueryEncoder`] is the standalone flat
//! encoder for query-protocol request bodies.

use crate::encode::{FieldEncoder, FieldMarshaler, ListEncoder, MapEncoder, StreamMarshaler};
use crate::error::{FirstError, ProtocolError};
use crate::target::{Metadata, Target};
use crate::value::Value;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::BTreeMap;

/// Query parameters. `None` values render as a bare key (`?acl`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryValues {
    entries: BTreeMap<String, Vec<Option<String>>>,
}

impl QueryValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a raw query string, e.g. the static part of a URI template.
    pub fn parse(raw: &str) -> Self {
        let mut values = Self::new();
        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((k, v)) => values.add(query_unescape(k), query_unescape(v)),
                None => values.add_flag(query_unescape(pair)),
            }
        }
        values
    }

    /// Appends a value to the key.
    pub fn add(&mut self, k: impl Into<String>, v: impl Into<String>) {
        self.entries.entry(k.into()).or_default().push(Some(v.into()));
    }

    /// Appends a bare key with no value.
    pub fn add_flag(&mut self, k: impl Into<String>) {
        self.entries.entry(k.into()).or_default().push(None);
    }

    /// Replaces any existing values for the key.
    pub fn set(&mut self, k: impl Into<String>, v: impl Into<String>) {
        self.entries.insert(k.into(), vec![Some(v.into())]);
    }

    /// Returns the first value for the key.
    pub fn get(&self, k: &str) -> Option<&str> {
        self.entries
            .get(k)
            .and_then(|vs| vs.first())
            .map(|v| v.as_deref().unwrap_or(""))
    }

    pub fn get_all(&self, k: &str) -> Vec<&str> {
        self.entries
            .get(k)
            .map(|vs| vs.iter().map(|v| v.as_deref().unwrap_or("")).collect())
            .unwrap_or_default()
    }

    pub fn contains_key(&self, k: &str) -> bool {
        self.entries.contains_key(k)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the values sorted by key.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (k, vs) in &self.entries {
            let key = query_escape(k);
            for v in vs {
                if !out.is_empty() {
                    out.push('&');
                }
                out.push_str(&key);
                if let Some(v) = v {
                    out.push('=');
                    out.push_str(&query_escape(v));
                }
            }
        }
        out
    }
}

/// Bytes escaped in a query component: everything but RFC 3986 unreserved.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Escapes a query component. Spaces become `+`.
pub fn query_escape(s: &str) -> String {
    // A literal "%20" in the input is escaped as "%2520", so only spaces match.
    utf8_percent_encode(s, QUERY_COMPONENT)
        .to_string()
        .replace("%20", "+")
}

/// Reverses [`query_escape`]. Malformed escapes are kept literally.
pub fn query_unescape(s: &str) -> String {
    percent_decode_str(&s.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// Encodes list elements as repeated values of one query key.
pub struct QueryListEncoder<'a> {
    pub(crate) key: String,
    pub(crate) query: &'a mut QueryValues,
    pub(crate) err: FirstError,
}

impl<'a> QueryListEncoder<'a> {
    pub fn new(key: impl Into<String>, query: &'a mut QueryValues) -> Self {
        Self {
            key: key.into(),
            query,
            err: FirstError::new(),
        }
    }

    pub fn into_error(self) -> FirstError {
        self.err
    }
}

impl ListEncoder for QueryListEncoder<'_> {
    fn list_add_value(&mut self, v: &Value) {
        if self.err.is_set() {
            return;
        }
        self.query.add(self.key.clone(), v.marshal_value());
    }

    fn list_add_list(&mut self, _f: &mut dyn FnMut(&mut dyn ListEncoder)) {
        self.err
            .record(ProtocolError::unsupported_shape("query", "list of list", &self.key));
    }

    fn list_add_map(&mut self, _f: &mut dyn FnMut(&mut dyn MapEncoder)) {
        self.err
            .record(ProtocolError::unsupported_shape("query", "list of map", &self.key));
    }

    fn list_add_fields(&mut self, _m: &dyn FieldMarshaler) {
        self.err.record(ProtocolError::unsupported_shape(
            "query",
            "list of structure",
            &self.key,
        ));
    }
}

/// Encodes map entries as query keys, optionally prefixed.
pub struct QueryMapEncoder<'a> {
    pub(crate) prefix: String,
    pub(crate) query: &'a mut QueryValues,
    pub(crate) err: FirstError,
}

impl<'a> QueryMapEncoder<'a> {
    pub fn new(prefix: impl Into<String>, query: &'a mut QueryValues) -> Self {
        Self {
            prefix: prefix.into(),
            query,
            err: FirstError::new(),
        }
    }

    pub fn into_error(self) -> FirstError {
        self.err
    }

    fn key(&self, k: &str) -> String {
        format!("{}{}", self.prefix, k)
    }
}

impl MapEncoder for QueryMapEncoder<'_> {
    fn map_set_value(&mut self, k: &str, v: &Value) {
        if self.err.is_set() {
            return;
        }
        let key = self.key(k);
        self.query.add(key, v.marshal_value());
    }

    fn map_set_list(&mut self, k: &str, f: &mut dyn FnMut(&mut dyn ListEncoder)) {
        if self.err.is_set() {
            return;
        }
        let key = self.key(k);
        let mut nested = QueryListEncoder::new(key, self.query);
        f(&mut nested);
        let err = nested.into_error();
        self.err.merge(err);
    }

    fn map_set_map(&mut self, k: &str, _f: &mut dyn FnMut(&mut dyn MapEncoder)) {
        let key = self.key(k);
        self.err
            .record(ProtocolError::unsupported_shape("query", "map of map", &key));
    }

    fn map_set_fields(&mut self, k: &str, _m: &dyn FieldMarshaler) {
        let key = self.key(k);
        self.err.record(ProtocolError::unsupported_shape(
            "query",
            "map of structure",
            &key,
        ));
    }
}

/// Flat query-string field encoder. Accepts `Body` and `Query` targets.
#[derive(Debug, Default)]
pub struct QueryEncoder {
    query: QueryValues,
    err: FirstError,
}

impl QueryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from existing parameters, e.g. `Action` and `Version`.
    pub fn with_values(query: QueryValues) -> Self {
        Self {
            query,
            err: FirstError::new(),
        }
    }

    /// Marshals `m` and returns the collected parameters.
    pub fn encode_fields(m: &dyn FieldMarshaler) -> Result<QueryValues, ProtocolError> {
        let mut e = Self::new();
        let result = m.marshal_fields(&mut e);
        e.err.record_result(result);
        e.encode()
    }

    pub fn encode(self) -> Result<QueryValues, ProtocolError> {
        self.err.into_result()?;
        Ok(self.query)
    }

    fn check_target(&mut self, op: &'static str, t: Target, k: &str) -> bool {
        if self.err.is_set() {
            return false;
        }
        match t {
            Target::Body | Target::Query => true,
            _ => {
                self.err
                    .record(ProtocolError::unsupported_target("query", op, t, k));
                false
            }
        }
    }
}

impl FieldEncoder for QueryEncoder {
    fn set_value(&mut self, t: Target, k: &str, v: &Value, meta: &Metadata) {
        if !self.check_target("set_value", t, k) {
            return;
        }
        if meta.no_value {
            self.query.add_flag(k);
        } else {
            self.query.add(k, v.marshal_value());
        }
    }

    fn set_stream(&mut self, t: Target, k: &str, _v: &dyn StreamMarshaler, _meta: &Metadata) {
        self.err
            .record(ProtocolError::unsupported_target("query", "set_stream", t, k));
    }

    fn set_list(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn ListEncoder),
        _meta: &Metadata,
    ) {
        if !self.check_target("set_list", t, k) {
            return;
        }
        let mut nested = QueryListEncoder::new(k, &mut self.query);
        f(&mut nested);
        let err = nested.into_error();
        self.err.merge(err);
    }

    fn set_map(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn MapEncoder),
        _meta: &Metadata,
    ) {
        if !self.check_target("set_map", t, k) {
            return;
        }
        let mut nested = QueryMapEncoder::new("", &mut self.query);
        f(&mut nested);
        let err = nested.into_error();
        self.err.merge(err);
    }

    fn set_fields(&mut self, _t: Target, k: &str, _m: &dyn FieldMarshaler, _meta: &Metadata) {
        self.err
            .record(ProtocolError::unsupported_shape("query", "nested structure", k));
    }
}
