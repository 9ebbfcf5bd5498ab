use crate::decode::{FieldDecoder, FieldUnmarshaler, ListDecoder, MapDecoder};
use crate::error::{FirstError, ProtocolError};
use crate::target::{Metadata, Target};
use crate::value::{parse_float, TimeFormat, TimeValue, Value, ValueKind};
use base64::Engine;
use serde_json::{Map, Value as JsonValue};

fn json_type_name(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn mismatch(key: &str, expected: ValueKind, found: &JsonValue) -> ProtocolError {
    ProtocolError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: json_type_name(found),
    }
}

/// Converts one JSON member to a value of the requested kind.
fn to_value(key: &str, kind: ValueKind, v: &JsonValue) -> Result<Value, ProtocolError> {
    match (kind, v) {
        (ValueKind::String, JsonValue::String(s)) => Ok(Value::String(s.clone())),
        (ValueKind::Int64, JsonValue::Number(n)) => {
            n.as_i64().map(Value::Int64).ok_or_else(|| ProtocolError::InvalidValue {
                key: key.to_string(),
                kind,
                value: n.to_string(),
            })
        }
        (ValueKind::Float64, JsonValue::Number(n)) => {
            n.as_f64().map(Value::Float64).ok_or_else(|| mismatch(key, kind, v))
        }
        (ValueKind::Float64, JsonValue::String(s)) => {
            parse_float(s)
                .map(Value::Float64)
                .ok_or_else(|| ProtocolError::InvalidValue {
                    key: key.to_string(),
                    kind,
                    value: s.clone(),
                })
        }
        (ValueKind::Bool, JsonValue::Bool(b)) => Ok(Value::Bool(*b)),
        (ValueKind::Time(format), JsonValue::Number(n)) => {
            let value = TimeValue::parse(&n.to_string(), TimeFormat::UnixEpoch)?;
            Ok(Value::Time(TimeValue::new(value, format)))
        }
        (ValueKind::Time(format), JsonValue::String(s)) => {
            let value = TimeValue::parse(s, format).or_else(|_| TimeValue::parse_any(s))?;
            Ok(Value::Time(TimeValue::new(value, format)))
        }
        (ValueKind::Bytes, JsonValue::String(s)) => base64::engine::general_purpose::STANDARD
            .decode(s)
            .map(Value::Bytes)
            .map_err(|e| ProtocolError::InvalidBase64 {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        _ => Err(mismatch(key, kind, v)),
    }
}

/// Decodes a shape from a JSON object.
///
/// `Body` targets read members by key. A `Payload` target on `get_fields`
/// reads the nested shape from the current object, mirroring the encoder's
/// splice.
#[derive(Debug, Clone)]
pub struct JsonDecoder {
    root: Map<String, JsonValue>,
}

impl JsonDecoder {
    /// Parses a document. An empty body decodes as an empty object.
    pub fn new(body: &[u8]) -> Result<Self, ProtocolError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self { root: Map::new() });
        }
        Self::from_value(serde_json::from_slice(body)?)
    }

    pub fn from_value(value: JsonValue) -> Result<Self, ProtocolError> {
        match value {
            JsonValue::Object(root) => Ok(Self { root }),
            other => Err(shape_mismatch("<root>", "object", &other)),
        }
    }

    /// Unmarshals `m` from the document.
    pub fn decode(&self, m: &mut dyn FieldUnmarshaler) -> Result<(), ProtocolError> {
        let mut err = FirstError::new();
        let mut reader = JsonObjectReader {
            obj: &self.root,
            err: &mut err,
        };
        let result = m.unmarshal_fields(&mut reader);
        err.record_result(result);
        err.into_result()
    }

    pub(crate) fn reader<'a>(&'a self, err: &'a mut FirstError) -> JsonObjectReader<'a> {
        JsonObjectReader {
            obj: &self.root,
            err,
        }
    }
}

/// Reads the members of one JSON object.
pub(crate) struct JsonObjectReader<'a> {
    obj: &'a Map<String, JsonValue>,
    err: &'a mut FirstError,
}

impl<'a> JsonObjectReader<'a> {
    /// Returns the non-null member for `k` if reading may proceed.
    fn member(&mut self, op: &'static str, t: Target, k: &str) -> Option<&'a JsonValue> {
        if self.err.is_set() {
            return None;
        }
        if t != Target::Body {
            self.err
                .record(ProtocolError::unsupported_target("json", op, t, k));
            return None;
        }
        let obj: &'a Map<String, JsonValue> = self.obj;
        obj.get(k).filter(|v| !v.is_null())
    }
}

impl FieldDecoder for JsonObjectReader<'_> {
    fn get(&mut self, t: Target, k: &str, kind: ValueKind, f: &mut dyn FnMut(Value), _meta: &Metadata) {
        if let Some(v) = self.member("get", t, k) {
            if let Some(v) = self.err.record_result(to_value(k, kind, v)) {
                f(v);
            }
        }
    }

    fn get_list(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn ListDecoder),
        _meta: &Metadata,
    ) {
        match self.member("get_list", t, k) {
            Some(JsonValue::Array(items)) => {
                let mut nested = JsonListReader {
                    key: k.to_string(),
                    items,
                    err: &mut *self.err,
                };
                f(&mut nested);
            }
            Some(other) => self.err.record(shape_mismatch(k, "array", other)),
            None => {}
        }
    }

    fn get_map(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn MapDecoder),
        _meta: &Metadata,
    ) {
        match self.member("get_map", t, k) {
            Some(JsonValue::Object(map)) => {
                let mut nested = JsonObjectReader {
                    obj: map,
                    err: &mut *self.err,
                };
                f(&mut nested);
            }
            Some(other) => self.err.record(shape_mismatch(k, "object", other)),
            None => {}
        }
    }

    fn get_fields(&mut self, t: Target, k: &str, m: &mut dyn FieldUnmarshaler, _meta: &Metadata) {
        if self.err.is_set() {
            return;
        }
        let nested_obj = match t {
            Target::Payload => self.obj,
            Target::Body => match self.obj.get(k) {
                Some(JsonValue::Object(map)) => map,
                Some(JsonValue::Null) | None => return,
                Some(other) => {
                    self.err.record(shape_mismatch(k, "object", other));
                    return;
                }
            },
            _ => {
                self.err
                    .record(ProtocolError::unsupported_target("json", "get_fields", t, k));
                return;
            }
        };
        let mut nested = JsonObjectReader {
            obj: nested_obj,
            err: &mut *self.err,
        };
        let result = m.unmarshal_fields(&mut nested);
        self.err.record_result(result);
    }
}

impl MapDecoder for JsonObjectReader<'_> {
    fn keys(&self) -> Vec<String> {
        self.obj.keys().cloned().collect()
    }

    fn map_get(&mut self, k: &str, kind: ValueKind, f: &mut dyn FnMut(Value)) {
        self.get(Target::Body, k, kind, f, &Metadata::default());
    }

    fn map_get_list(&mut self, k: &str, f: &mut dyn FnMut(&mut dyn ListDecoder)) {
        self.get_list(Target::Body, k, f, &Metadata::default());
    }

    fn map_get_map(&mut self, k: &str, f: &mut dyn FnMut(&mut dyn MapDecoder)) {
        self.get_map(Target::Body, k, f, &Metadata::default());
    }

    fn map_get_fields(&mut self, k: &str, m: &mut dyn FieldUnmarshaler) {
        self.get_fields(Target::Body, k, m, &Metadata::default());
    }
}

fn shape_mismatch(key: &str, expected: &'static str, found: &JsonValue) -> ProtocolError {
    ProtocolError::Marshal(format!(
        "expected JSON {} for key {:?}, found {}",
        expected,
        key,
        json_type_name(found)
    ))
}

/// Reads the elements of one JSON array.
struct JsonListReader<'a> {
    key: String,
    items: &'a [JsonValue],
    err: &'a mut FirstError,
}

impl ListDecoder for JsonListReader<'_> {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn list_get(&mut self, kind: ValueKind, f: &mut dyn FnMut(Value)) {
        for item in self.items {
            if self.err.is_set() {
                return;
            }
            if item.is_null() {
                continue;
            }
            if let Some(v) = self.err.record_result(to_value(&self.key, kind, item)) {
                f(v);
            }
        }
    }

    fn list_get_list(&mut self, f: &mut dyn FnMut(&mut dyn ListDecoder)) {
        for item in self.items {
            if self.err.is_set() {
                return;
            }
            match item {
                JsonValue::Array(items) => {
                    let mut nested = JsonListReader {
                        key: self.key.clone(),
                        items,
                        err: &mut *self.err,
                    };
                    f(&mut nested);
                }
                other => self.err.record(shape_mismatch(&self.key, "array", other)),
            }
        }
    }

    fn list_get_map(&mut self, f: &mut dyn FnMut(&mut dyn MapDecoder)) {
        for item in self.items {
            if self.err.is_set() {
                return;
            }
            match item {
                JsonValue::Object(obj) => {
                    let mut nested = JsonObjectReader {
                        obj,
                        err: &mut *self.err,
                    };
                    f(&mut nested);
                }
                other => self.err.record(shape_mismatch(&self.key, "object", other)),
            }
        }
    }

    fn list_get_fields(
        &mut self,
        f: &mut dyn FnMut(&mut dyn FieldDecoder) -> Result<(), ProtocolError>,
    ) {
        for item in self.items {
            if self.err.is_set() {
                return;
            }
            match item {
                JsonValue::Object(obj) => {
                    let mut nested = JsonObjectReader {
                        obj,
                        err: &mut *self.err,
                    };
                    let result = f(&mut nested);
                    self.err.record_result(result);
                }
                other => self.err.record(shape_mismatch(&self.key, "object", other)),
            }
        }
    }
}
