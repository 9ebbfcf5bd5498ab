use crate::encode::{FieldEncoder, FieldMarshaler, ListEncoder, MapEncoder, StreamMarshaler};
use crate::error::{FirstError, ProtocolError};
use crate::target::{Metadata, Target};
use crate::value::{FieldBuffer, Value};
use bytes::Bytes;

/// Buffer and error slot shared by every writer of one document.
#[derive(Debug, Default)]
struct JsonState {
    buf: Vec<u8>,
    field_buf: FieldBuffer,
    err: FirstError,
}

impl JsonState {
    fn write_str(&mut self, s: &str) {
        if let Err(e) = serde_json::to_writer(&mut self.buf, s) {
            self.err.record(e.into());
        }
    }

    fn write_value(&mut self, key: &str, v: &Value) {
        let JsonState {
            buf,
            field_buf,
            err,
        } = self;
        let text = field_buf.get_value(v);
        if !v.is_json_quoted() {
            buf.extend_from_slice(text);
            return;
        }
        match std::str::from_utf8(text) {
            Ok(s) => {
                if let Err(e) = serde_json::to_writer(&mut *buf, s) {
                    err.record(e.into());
                }
            }
            Err(_) => err.record(ProtocolError::InvalidUtf8(format!("value for key {:?}", key))),
        }
    }
}

/// Encodes a shape as a JSON object.
///
/// Accepts `Body` targets for values, lists and maps. A `Payload` target on
/// `set_fields` splices the nested shape's members into the current object
/// without a wrapping key.
#[derive(Debug)]
pub struct JsonEncoder {
    state: JsonState,
    started: bool,
}

impl Default for JsonEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonEncoder {
    pub fn new() -> Self {
        let mut state = JsonState::default();
        state.buf.push(b'{');
        Self {
            state,
            started: false,
        }
    }

    /// Marshals `m` as a standalone document.
    pub fn encode_fields(m: &dyn FieldMarshaler) -> Result<Option<Bytes>, ProtocolError> {
        let mut e = Self::new();
        let result = m.marshal_fields(&mut e);
        e.state.err.record_result(result);
        e.encode()
    }

    /// Closes the root object. An object with no members yields `None` so
    /// callers can omit the body entirely.
    pub fn encode(mut self) -> Result<Option<Bytes>, ProtocolError> {
        self.state.err.into_result()?;
        self.state.buf.push(b'}');
        if self.state.buf.len() == 2 {
            return Ok(None);
        }
        Ok(Some(Bytes::from(self.state.buf)))
    }

    pub(crate) fn take_error(&mut self) -> Option<ProtocolError> {
        self.state.err.take()
    }

    fn with_root(&mut self, f: impl FnOnce(&mut JsonWriter<'_>)) {
        let mut w = JsonWriter {
            state: &mut self.state,
            started: self.started,
        };
        f(&mut w);
        self.started = w.started;
    }
}

impl FieldEncoder for JsonEncoder {
    fn set_value(&mut self, t: Target, k: &str, v: &Value, meta: &Metadata) {
        self.with_root(|w| w.set_value(t, k, v, meta));
    }

    fn set_stream(&mut self, t: Target, k: &str, v: &dyn StreamMarshaler, meta: &Metadata) {
        self.with_root(|w| w.set_stream(t, k, v, meta));
    }

    fn set_list(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn ListEncoder),
        meta: &Metadata,
    ) {
        self.with_root(|w| w.set_list(t, k, f, meta));
    }

    fn set_map(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn MapEncoder),
        meta: &Metadata,
    ) {
        self.with_root(|w| w.set_map(t, k, f, meta));
    }

    fn set_fields(&mut self, t: Target, k: &str, m: &dyn FieldMarshaler, meta: &Metadata) {
        self.with_root(|w| w.set_fields(t, k, m, meta));
    }
}

/// Writes the members of one JSON object or array.
///
/// The same writer serves as field encoder inside objects, list encoder
/// inside arrays and map encoder inside map objects.
pub struct JsonWriter<'a> {
    state: &'a mut JsonState,
    started: bool,
}

impl<'a> JsonWriter<'a> {
    fn write_sep(&mut self) {
        if self.started {
            self.state.buf.push(b',');
        } else {
            self.started = true;
        }
    }

    fn write_key(&mut self, k: &str) {
        self.state.write_str(k);
        self.state.buf.push(b':');
    }

    fn write_nested(&mut self, open: u8, close: u8, f: impl FnOnce(&mut JsonWriter<'_>)) {
        self.state.buf.push(open);
        let mut nested = JsonWriter {
            state: &mut *self.state,
            started: false,
        };
        f(&mut nested);
        self.state.buf.push(close);
    }

    fn write_fields(&mut self, m: &dyn FieldMarshaler) {
        self.write_nested(b'{', b'}', |w| {
            let result = m.marshal_fields(&mut *w);
            w.state.err.record_result(result);
        });
    }

    fn check_body(&mut self, op: &'static str, t: Target, k: &str) -> bool {
        if self.state.err.is_set() {
            return false;
        }
        if t != Target::Body {
            self.state
                .err
                .record(ProtocolError::unsupported_target("json", op, t, k));
            return false;
        }
        true
    }
}

impl FieldEncoder for JsonWriter<'_> {
    fn set_value(&mut self, t: Target, k: &str, v: &Value, _meta: &Metadata) {
        if !self.check_body("set_value", t, k) {
            return;
        }
        self.write_sep();
        self.write_key(k);
        self.state.write_value(k, v);
    }

    fn set_stream(&mut self, t: Target, k: &str, _v: &dyn StreamMarshaler, _meta: &Metadata) {
        self.state
            .err
            .record(ProtocolError::unsupported_target("json", "set_stream", t, k));
    }

    fn set_list(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn ListEncoder),
        _meta: &Metadata,
    ) {
        if !self.check_body("set_list", t, k) {
            return;
        }
        self.write_sep();
        self.write_key(k);
        self.write_nested(b'[', b']', |w| f(w));
    }

    fn set_map(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn MapEncoder),
        _meta: &Metadata,
    ) {
        if !self.check_body("set_map", t, k) {
            return;
        }
        self.write_sep();
        self.write_key(k);
        self.write_nested(b'{', b'}', |w| f(w));
    }

    fn set_fields(&mut self, t: Target, k: &str, m: &dyn FieldMarshaler, _meta: &Metadata) {
        if self.state.err.is_set() {
            return;
        }
        match t {
            Target::Payload => {
                // Members land in this object, continuing its separators.
                let result = m.marshal_fields(&mut *self);
                self.state.err.record_result(result);
            }
            Target::Body => {
                self.write_sep();
                self.write_key(k);
                self.write_fields(m);
            }
            _ => self
                .state
                .err
                .record(ProtocolError::unsupported_target("json", "set_fields", t, k)),
        }
    }
}

impl ListEncoder for JsonWriter<'_> {
    fn list_add_value(&mut self, v: &Value) {
        if self.state.err.is_set() {
            return;
        }
        self.write_sep();
        self.state.write_value("list member", v);
    }

    fn list_add_list(&mut self, f: &mut dyn FnMut(&mut dyn ListEncoder)) {
        if self.state.err.is_set() {
            return;
        }
        self.write_sep();
        self.write_nested(b'[', b']', |w| f(w));
    }

    fn list_add_map(&mut self, f: &mut dyn FnMut(&mut dyn MapEncoder)) {
        if self.state.err.is_set() {
            return;
        }
        self.write_sep();
        self.write_nested(b'{', b'}', |w| f(w));
    }

    fn list_add_fields(&mut self, m: &dyn FieldMarshaler) {
        if self.state.err.is_set() {
            return;
        }
        self.write_sep();
        self.write_fields(m);
    }
}

impl MapEncoder for JsonWriter<'_> {
    fn map_set_value(&mut self, k: &str, v: &Value) {
        if self.state.err.is_set() {
            return;
        }
        self.write_sep();
        self.write_key(k);
        self.state.write_value(k, v);
    }

    fn map_set_list(&mut self, k: &str, f: &mut dyn FnMut(&mut dyn ListEncoder)) {
        if self.state.err.is_set() {
            return;
        }
        self.write_sep();
        self.write_key(k);
        self.write_nested(b'[', b']', |w| f(w));
    }

    fn map_set_map(&mut self, k: &str, f: &mut dyn FnMut(&mut dyn MapEncoder)) {
        if self.state.err.is_set() {
            return;
        }
        self.write_sep();
        self.write_key(k);
        self.write_nested(b'{', b'}', |w| f(w));
    }

    fn map_set_fields(&mut self, k: &str, m: &dyn FieldMarshaler) {
        if self.state.err.is_set() {
            return;
        }
        self.write_sep();
        self.write_key(k);
        self.write_fields(m);
    }
}
