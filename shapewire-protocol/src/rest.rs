//! REST request encoding and response decoding.
//!
//! [`RestEncoder`] places fields in the URI path, query string and headers,
//! and holds an optional raw payload stream. [`RestBodyEncoder`] composes it
//! with a structured body encoder to form the REST-JSON and REST-XML
//! protocols.

use crate::decode::{FieldDecoder, FieldUnmarshaler, ListDecoder, MapDecoder};
use crate::encode::{FieldEncoder, FieldMarshaler, ListEncoder, MapEncoder, StreamMarshaler};
use crate::error::{FirstError, ProtocolError};
use crate::header::{header_pair, HeaderListEncoder, HeaderMapEncoder};
use crate::path::{split_template, PathReplace};
use crate::query::{QueryListEncoder, QueryMapEncoder, QueryValues};
use crate::target::{Metadata, Target};
use crate::value::{Value, ValueKind};
use bytes::Bytes;
use http::{HeaderMap, Method};
use std::collections::BTreeMap;

/// The encoded parts of an HTTP request.
#[derive(Debug, Clone)]
pub struct EncodedRequest {
    pub method: Method,
    /// Path with parameters substituted verbatim.
    pub path: String,
    /// Path with parameters percent-encoded, suitable for the wire.
    pub raw_path: String,
    pub query: QueryValues,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl EncodedRequest {
    /// Returns the request target: raw path plus encoded query string.
    pub fn uri(&self) -> String {
        let query = self.query.encode();
        if query.is_empty() {
            self.raw_path.clone()
        } else {
            format!("{}?{}", self.raw_path, query)
        }
    }
}

/// Encodes path, query and header fields of a REST request.
///
/// `Body` targets are folded into the query string for GET requests and
/// rejected for every other method.
#[derive(Debug)]
pub struct RestEncoder {
    method: Method,
    path: PathReplace,
    query: QueryValues,
    headers: HeaderMap,
    payload: Option<Bytes>,
    err: FirstError,
}

impl RestEncoder {
    /// Creates an encoder for a URI template such as `/{Bucket}/{Key+}?uploads`.
    /// Static query parameters in the template are kept.
    pub fn new(method: Method, uri_template: &str) -> Self {
        let (path, query) = split_template(uri_template);
        Self {
            method,
            path: PathReplace::new(path),
            query: query.map(QueryValues::parse).unwrap_or_default(),
            headers: HeaderMap::new(),
            payload: None,
            err: FirstError::new(),
        }
    }

    /// Starts from existing headers. Encoded headers replace duplicates.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn encode(self) -> Result<EncodedRequest, ProtocolError> {
        self.err.into_result()?;
        let (path, raw_path) = self.path.encode();
        Ok(EncodedRequest {
            method: self.method,
            path,
            raw_path,
            query: self.query,
            headers: self.headers,
            body: self.payload,
        })
    }

    fn folds_body(&self) -> bool {
        self.method == Method::GET
    }

    fn body_not_allowed(&mut self, k: &str) {
        self.err.record(ProtocolError::BodyNotAllowed {
            method: self.method.to_string(),
            key: k.to_string(),
        });
    }
}

impl FieldEncoder for RestEncoder {
    fn set_value(&mut self, t: Target, k: &str, v: &Value, meta: &Metadata) {
        if self.err.is_set() {
            return;
        }
        match t {
            Target::Header => {
                if let Some((name, value)) = self.err.record_result(header_pair(k, &v.marshal_value())) {
                    self.headers.insert(name, value);
                }
            }
            Target::Path => {
                let result = self.path.replace_element(k, &v.marshal_value());
                self.err.record_result(result);
            }
            Target::Query | Target::Body => {
                if t == Target::Body && !self.folds_body() {
                    self.body_not_allowed(k);
                } else if meta.no_value {
                    self.query.add_flag(k);
                } else {
                    self.query.set(k, v.marshal_value());
                }
            }
            _ => self
                .err
                .record(ProtocolError::unsupported_target("rest", "set_value", t, k)),
        }
    }

    fn set_stream(&mut self, t: Target, k: &str, v: &dyn StreamMarshaler, _meta: &Metadata) {
        if self.err.is_set() {
            return;
        }
        match t {
            Target::Payload => self.payload = self.err.record_result(v.marshal_stream()),
            _ => self
                .err
                .record(ProtocolError::unsupported_target("rest", "set_stream", t, k)),
        }
    }

    fn set_list(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn ListEncoder),
        _meta: &Metadata,
    ) {
        if self.err.is_set() {
            return;
        }
        let nested_err = match t {
            Target::Body if !self.folds_body() => {
                self.body_not_allowed(k);
                return;
            }
            Target::Query | Target::Body => {
                let mut nested = QueryListEncoder::new(k, &mut self.query);
                f(&mut nested);
                nested.into_error()
            }
            Target::Header => {
                let mut nested = HeaderListEncoder::new(k, &mut self.headers);
                f(&mut nested);
                nested.into_error()
            }
            _ => {
                self.err
                    .record(ProtocolError::unsupported_target("rest", "set_list", t, k));
                return;
            }
        };
        self.err.merge(nested_err);
    }

    fn set_map(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn MapEncoder),
        _meta: &Metadata,
    ) {
        if self.err.is_set() {
            return;
        }
        let nested_err = match t {
            Target::Body if !self.folds_body() => {
                self.body_not_allowed(k);
                return;
            }
            Target::Query | Target::Body => {
                let mut nested = QueryMapEncoder::new("", &mut self.query);
                f(&mut nested);
                nested.into_error()
            }
            Target::Headers => {
                let mut nested = HeaderMapEncoder::new(k, &mut self.headers);
                f(&mut nested);
                nested.into_error()
            }
            _ => {
                self.err
                    .record(ProtocolError::unsupported_target("rest", "set_map", t, k));
                return;
            }
        };
        self.err.merge(nested_err);
    }

    fn set_fields(&mut self, _t: Target, k: &str, _m: &dyn FieldMarshaler, _meta: &Metadata) {
        self.err
            .record(ProtocolError::unsupported_shape("rest", "nested structure", k));
    }
}

/// A structured body encoder usable inside [`RestBodyEncoder`].
pub trait BodyEncoder: FieldEncoder + Default {
    /// Protocol name used in error messages, e.g. `rest-json`.
    const PROTOCOL: &'static str;
    /// Body format name, e.g. `JSON`.
    const FORMAT: &'static str;

    fn finish(self) -> Result<Option<Bytes>, ProtocolError>;

    /// Removes and returns the encoder's recorded error, if any.
    fn take_error(&mut self) -> Option<ProtocolError>;
}

impl BodyEncoder for crate::json::JsonEncoder {
    const PROTOCOL: &'static str = "rest-json";
    const FORMAT: &'static str = "JSON";

    fn finish(self) -> Result<Option<Bytes>, ProtocolError> {
        self.encode()
    }

    fn take_error(&mut self) -> Option<ProtocolError> {
        self.take_error()
    }
}

impl BodyEncoder for crate::xml::XmlEncoder {
    const PROTOCOL: &'static str = "rest-xml";
    const FORMAT: &'static str = "XML";

    fn finish(self) -> Result<Option<Bytes>, ProtocolError> {
        self.encode()
    }

    fn take_error(&mut self) -> Option<ProtocolError> {
        self.take_error()
    }
}

/// A REST encoder paired with a structured body encoder.
///
/// `Body` targets go to the body encoder, or to the query string for GET.
/// Stream payloads go to the REST encoder. Setting both a structured body and
/// a stream payload fails at [`encode`](Self::encode).
///
/// Errors from both inner encoders are pulled into one slot after every
/// delegated call, so the first failure stops all later calls.
#[derive(Debug)]
pub struct RestBodyEncoder<B> {
    rest: RestEncoder,
    body: B,
    err: FirstError,
}

impl<B: BodyEncoder> RestBodyEncoder<B> {
    pub fn new(method: Method, uri_template: &str) -> Self {
        Self::from_rest(RestEncoder::new(method, uri_template))
    }

    pub fn from_rest(rest: RestEncoder) -> Self {
        Self {
            rest,
            body: B::default(),
            err: FirstError::new(),
        }
    }

    /// Marshals `m` into a complete request.
    pub fn encode_fields(
        method: Method,
        uri_template: &str,
        m: &dyn FieldMarshaler,
    ) -> Result<EncodedRequest, ProtocolError> {
        let mut e = Self::new(method, uri_template);
        let result = m.marshal_fields(&mut e);
        e.err.record_result(result);
        e.encode()
    }

    pub fn encode(self) -> Result<EncodedRequest, ProtocolError> {
        self.err.into_result()?;
        let mut req = self.rest.encode()?;
        if let Some(body) = self.body.finish()? {
            if req.body.is_some() {
                return Err(ProtocolError::BodyPayloadConflict { body: B::FORMAT });
            }
            req.body = Some(body);
        }
        Ok(req)
    }

    fn body_to_rest(&self, t: Target) -> bool {
        t == Target::Body && self.rest.folds_body()
    }

    fn unsupported(&mut self, op: &'static str, t: Target, k: &str) {
        self.err
            .record(ProtocolError::unsupported_target(B::PROTOCOL, op, t, k));
    }

    fn collect_errors(&mut self) {
        if let Some(e) = self.rest.err.take() {
            self.err.record(e);
        }
        if let Some(e) = self.body.take_error() {
            self.err.record(e);
        }
    }
}

impl<B: BodyEncoder> FieldEncoder for RestBodyEncoder<B> {
    fn set_value(&mut self, t: Target, k: &str, v: &Value, meta: &Metadata) {
        if self.err.is_set() {
            return;
        }
        match t {
            Target::Path | Target::Query | Target::Header => self.rest.set_value(t, k, v, meta),
            Target::Body if self.body_to_rest(t) => self.rest.set_value(t, k, v, meta),
            Target::Body => self.body.set_value(t, k, v, meta),
            _ => self.unsupported("set_value", t, k),
        }
        self.collect_errors();
    }

    fn set_stream(&mut self, t: Target, k: &str, v: &dyn StreamMarshaler, meta: &Metadata) {
        if self.err.is_set() {
            return;
        }
        match t {
            Target::Payload => self.rest.set_stream(t, k, v, meta),
            _ => self.unsupported("set_stream", t, k),
        }
        self.collect_errors();
    }

    fn set_list(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn ListEncoder),
        meta: &Metadata,
    ) {
        if self.err.is_set() {
            return;
        }
        match t {
            Target::Query | Target::Header => self.rest.set_list(t, k, f, meta),
            Target::Body if self.body_to_rest(t) => self.rest.set_list(t, k, f, meta),
            Target::Body => self.body.set_list(t, k, f, meta),
            _ => self.unsupported("set_list", t, k),
        }
        self.collect_errors();
    }

    fn set_map(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn MapEncoder),
        meta: &Metadata,
    ) {
        if self.err.is_set() {
            return;
        }
        match t {
            Target::Query | Target::Headers => self.rest.set_map(t, k, f, meta),
            Target::Body if self.body_to_rest(t) => self.rest.set_map(t, k, f, meta),
            Target::Body => self.body.set_map(t, k, f, meta),
            _ => self.unsupported("set_map", t, k),
        }
        self.collect_errors();
    }

    fn set_fields(&mut self, t: Target, k: &str, m: &dyn FieldMarshaler, meta: &Metadata) {
        if self.err.is_set() {
            return;
        }
        match t {
            Target::Body if self.body_to_rest(t) => self.rest.set_fields(t, k, m, meta),
            Target::Body | Target::Payload => self.body.set_fields(t, k, m, meta),
            _ => self.unsupported("set_fields", t, k),
        }
        self.collect_errors();
    }
}

/// Decodes header and raw payload fields of a REST response.
#[derive(Debug, Clone, Default)]
pub struct RestDecoder {
    headers: HeaderMap,
    body: Bytes,
}

impl RestDecoder {
    pub fn new(headers: HeaderMap, body: Bytes) -> Self {
        Self { headers, body }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Unmarshals `m`. `Body` targets are rejected; use a composite decoder
    /// such as [`RestJsonDecoder`](crate::restjson::RestJsonDecoder) for
    /// structured bodies.
    pub fn decode(&self, m: &mut dyn FieldUnmarshaler) -> Result<(), ProtocolError> {
        let mut err = FirstError::new();
        let mut reader = self.reader(&mut err, None);
        let result = m.unmarshal_fields(&mut reader);
        err.record_result(result);
        err.into_result()
    }

    pub(crate) fn reader<'a>(
        &'a self,
        err: &'a mut FirstError,
        body: Option<&'a dyn BodyDecoder>,
    ) -> RestReader<'a> {
        RestReader {
            headers: &self.headers,
            payload: &self.body,
            err,
            body,
        }
    }
}

/// A structured body decoder a [`RestReader`] hands `Body` reads to.
///
/// The body reader records into the caller's error slot, so one slot holds
/// the first failure of the whole response.
pub(crate) trait BodyDecoder {
    fn with_reader(&self, err: &mut FirstError, f: &mut dyn FnMut(&mut dyn FieldDecoder));
}

impl BodyDecoder for crate::json::JsonDecoder {
    fn with_reader(&self, err: &mut FirstError, f: &mut dyn FnMut(&mut dyn FieldDecoder)) {
        let mut reader = self.reader(err);
        f(&mut reader);
    }
}

/// Field decoder over a response's headers and payload, delegating
/// structured body reads to an optional body decoder.
pub(crate) struct RestReader<'a> {
    headers: &'a HeaderMap,
    payload: &'a Bytes,
    err: &'a mut FirstError,
    body: Option<&'a dyn BodyDecoder>,
}

impl<'a> RestReader<'a> {
    fn header_text(&mut self, k: &str) -> Option<String> {
        let value = self.headers.get(k)?;
        match value.to_str() {
            Ok(s) => Some(s.to_string()),
            Err(_) => {
                self.err
                    .record(ProtocolError::InvalidUtf8(format!("header {:?}", k)));
                None
            }
        }
    }

    fn header_values(&mut self, k: &str, split: bool) -> Vec<String> {
        let mut out = Vec::new();
        for value in self.headers.get_all(k) {
            match value.to_str() {
                Ok(s) if split => out.extend(s.split(',').map(|p| p.trim().to_string())),
                Ok(s) => out.push(s.to_string()),
                Err(_) => self
                    .err
                    .record(ProtocolError::InvalidUtf8(format!("header {:?}", k))),
            }
        }
        out
    }

    fn prefixed_headers(&mut self, prefix: &str) -> BTreeMap<String, String> {
        let prefix = prefix.to_ascii_lowercase();
        let mut out = BTreeMap::new();
        for (name, value) in self.headers {
            let Some(suffix) = name.as_str().strip_prefix(&prefix) else {
                continue;
            };
            match value.to_str() {
                Ok(s) => {
                    out.insert(suffix.to_string(), s.to_string());
                }
                Err(_) => self
                    .err
                    .record(ProtocolError::InvalidUtf8(format!("header {:?}", name.as_str()))),
            }
        }
        out
    }

    fn payload_value(&mut self, k: &str, kind: ValueKind) -> Option<Value> {
        if self.payload.is_empty() {
            return None;
        }
        match kind {
            ValueKind::Bytes => Some(Value::Bytes(self.payload.to_vec())),
            kind => match std::str::from_utf8(self.payload) {
                Ok(text) => self.err.record_result(Value::parse(kind, k, text)),
                Err(_) => {
                    self.err
                        .record(ProtocolError::InvalidUtf8(format!("payload {:?}", k)));
                    None
                }
            },
        }
    }

    fn delegate(
        &mut self,
        op: &'static str,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn FieldDecoder),
    ) {
        match self.body {
            Some(body) => body.with_reader(&mut *self.err, f),
            None => self
                .err
                .record(ProtocolError::unsupported_target("rest", op, t, k)),
        }
    }
}

impl FieldDecoder for RestReader<'_> {
    fn get(&mut self, t: Target, k: &str, kind: ValueKind, f: &mut dyn FnMut(Value), meta: &Metadata) {
        if self.err.is_set() {
            return;
        }
        let value = match t {
            Target::Header => self
                .header_text(k)
                .and_then(|text| self.err.record_result(Value::parse(kind, k, &text))),
            Target::Payload => self.payload_value(k, kind),
            Target::Body => {
                self.delegate("get", t, k, &mut |body: &mut dyn FieldDecoder| {
                    body.get(t, k, kind, &mut *f, meta)
                });
                return;
            }
            _ => {
                self.err
                    .record(ProtocolError::unsupported_target("rest", "get", t, k));
                return;
            }
        };
        if let Some(v) = value {
            f(v);
        }
    }

    fn get_list(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn ListDecoder),
        meta: &Metadata,
    ) {
        if self.err.is_set() {
            return;
        }
        match t {
            Target::Header => {
                if !self.headers.contains_key(k) {
                    return;
                }
                let items = self.header_values(k, true);
                let mut nested = TextListDecoder {
                    key: k,
                    items,
                    err: &mut *self.err,
                };
                f(&mut nested);
            }
            Target::Body => {
                self.delegate("get_list", t, k, &mut |body: &mut dyn FieldDecoder| {
                    body.get_list(t, k, &mut *f, meta)
                })
            }
            _ => self
                .err
                .record(ProtocolError::unsupported_target("rest", "get_list", t, k)),
        }
    }

    fn get_map(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn MapDecoder),
        meta: &Metadata,
    ) {
        if self.err.is_set() {
            return;
        }
        match t {
            Target::Headers => {
                let entries = self.prefixed_headers(k);
                if entries.is_empty() {
                    return;
                }
                let mut nested = TextMapDecoder {
                    entries,
                    err: &mut *self.err,
                };
                f(&mut nested);
            }
            Target::Body => {
                self.delegate("get_map", t, k, &mut |body: &mut dyn FieldDecoder| {
                    body.get_map(t, k, &mut *f, meta)
                })
            }
            _ => self
                .err
                .record(ProtocolError::unsupported_target("rest", "get_map", t, k)),
        }
    }

    fn get_fields(&mut self, t: Target, k: &str, m: &mut dyn FieldUnmarshaler, meta: &Metadata) {
        if self.err.is_set() {
            return;
        }
        match t {
            Target::Body | Target::Payload => {
                self.delegate("get_fields", t, k, &mut |body: &mut dyn FieldDecoder| {
                    body.get_fields(t, k, &mut *m, meta)
                })
            }
            _ => self
                .err
                .record(ProtocolError::unsupported_target("rest", "get_fields", t, k)),
        }
    }
}

/// List of text values, e.g. a comma-separated header.
struct TextListDecoder<'a> {
    key: &'a str,
    items: Vec<String>,
    err: &'a mut FirstError,
}

impl ListDecoder for TextListDecoder<'_> {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn list_get(&mut self, kind: ValueKind, f: &mut dyn FnMut(Value)) {
        for item in &self.items {
            if self.err.is_set() {
                return;
            }
            if let Some(v) = self.err.record_result(Value::parse(kind, self.key, item)) {
                f(v);
            }
        }
    }

    fn list_get_list(&mut self, _f: &mut dyn FnMut(&mut dyn ListDecoder)) {
        self.err
            .record(ProtocolError::unsupported_shape("rest", "list of list", self.key));
    }

    fn list_get_map(&mut self, _f: &mut dyn FnMut(&mut dyn MapDecoder)) {
        self.err
            .record(ProtocolError::unsupported_shape("rest", "list of map", self.key));
    }

    fn list_get_fields(
        &mut self,
        _f: &mut dyn FnMut(&mut dyn FieldDecoder) -> Result<(), ProtocolError>,
    ) {
        self.err.record(ProtocolError::unsupported_shape(
            "rest",
            "list of structure",
            self.key,
        ));
    }
}

/// Map of text values, e.g. prefixed headers with the prefix removed.
struct TextMapDecoder<'a> {
    entries: BTreeMap<String, String>,
    err: &'a mut FirstError,
}

impl MapDecoder for TextMapDecoder<'_> {
    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn map_get(&mut self, k: &str, kind: ValueKind, f: &mut dyn FnMut(Value)) {
        if self.err.is_set() {
            return;
        }
        if let Some(text) = self.entries.get(k) {
            if let Some(v) = self.err.record_result(Value::parse(kind, k, text)) {
                f(v);
            }
        }
    }

    fn map_get_list(&mut self, k: &str, _f: &mut dyn FnMut(&mut dyn ListDecoder)) {
        self.err
            .record(ProtocolError::unsupported_shape("rest", "map of list", k));
    }

    fn map_get_map(&mut self, k: &str, _f: &mut dyn FnMut(&mut dyn MapDecoder)) {
        self.err
            .record(ProtocolError::unsupported_shape("rest", "map of map", k));
    }

    fn map_get_fields(&mut self, k: &str, _m: &mut dyn FieldUnmarshaler) {
        self.err
            .record(ProtocolError::unsupported_shape("rest", "map of structure", k));
    }
}
