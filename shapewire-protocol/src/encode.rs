//! Field encoder interfaces.
//!
//! A shape marshals itself by calling `set_*` on a [`FieldEncoder`]. Nested
//! lists and maps are written through a visitor callback that receives a
//! [`ListEncoder`] or [`MapEncoder`] scoped to the nested value, so one
//! encoder implementation serves arbitrarily deep shapes.
//!
//! Encoders never return errors from `set_*`. The first failure is recorded
//! and every later call becomes a no-op; the error surfaces from the
//! encoder's final `encode`.

use crate::error::ProtocolError;
use crate::target::{Metadata, Target};
use crate::value::Value;
use bytes::Bytes;
use std::collections::BTreeMap;

/// Implemented by shapes that can write their fields to an encoder.
pub trait FieldMarshaler {
    fn marshal_fields(&self, e: &mut dyn FieldEncoder) -> Result<(), ProtocolError>;
}

/// Implemented by values that marshal to a raw body stream.
pub trait StreamMarshaler {
    fn marshal_stream(&self) -> Result<Bytes, ProtocolError>;
}

/// Encodes list elements.
pub trait ListEncoder {
    fn list_add_value(&mut self, v: &Value);
    fn list_add_list(&mut self, f: &mut dyn FnMut(&mut dyn ListEncoder));
    fn list_add_map(&mut self, f: &mut dyn FnMut(&mut dyn MapEncoder));
    fn list_add_fields(&mut self, m: &dyn FieldMarshaler);
}

/// Encodes map entries.
pub trait MapEncoder {
    fn map_set_value(&mut self, k: &str, v: &Value);
    fn map_set_list(&mut self, k: &str, f: &mut dyn FnMut(&mut dyn ListEncoder));
    fn map_set_map(&mut self, k: &str, f: &mut dyn FnMut(&mut dyn MapEncoder));
    fn map_set_fields(&mut self, k: &str, m: &dyn FieldMarshaler);
}

/// Encodes a shape's members to the location named by each call's target.
pub trait FieldEncoder {
    fn set_value(&mut self, t: Target, k: &str, v: &Value, meta: &Metadata);
    fn set_stream(&mut self, t: Target, k: &str, v: &dyn StreamMarshaler, meta: &Metadata);
    fn set_list(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn ListEncoder),
        meta: &Metadata,
    );
    fn set_map(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn MapEncoder),
        meta: &Metadata,
    );
    fn set_fields(&mut self, t: Target, k: &str, m: &dyn FieldMarshaler, meta: &Metadata);
}

/// Returns a list visitor adding each element as a scalar value.
pub fn encode_value_list<T>(vs: &[T]) -> impl FnMut(&mut dyn ListEncoder) + '_
where
    T: Clone + Into<Value>,
{
    move |le: &mut dyn ListEncoder| {
        for v in vs {
            le.list_add_value(&v.clone().into());
        }
    }
}

/// Returns a map visitor setting each entry as a scalar value.
pub fn encode_value_map<T>(vs: &BTreeMap<String, T>) -> impl FnMut(&mut dyn MapEncoder) + '_
where
    T: Clone + Into<Value>,
{
    move |me: &mut dyn MapEncoder| {
        for (k, v) in vs {
            me.map_set_value(k, &v.clone().into());
        }
    }
}

pub fn encode_string_list(vs: &[String]) -> impl FnMut(&mut dyn ListEncoder) + '_ {
    encode_value_list(vs)
}

pub fn encode_string_map(vs: &BTreeMap<String, String>) -> impl FnMut(&mut dyn MapEncoder) + '_ {
    encode_value_map(vs)
}

/// Returns a list visitor adding each element as a nested shape.
pub fn encode_fields_list<M: FieldMarshaler>(vs: &[M]) -> impl FnMut(&mut dyn ListEncoder) + '_ {
    move |le: &mut dyn ListEncoder| {
        for v in vs {
            le.list_add_fields(v);
        }
    }
}

/// Returns a map visitor setting each entry as a nested shape.
pub fn encode_fields_map<M: FieldMarshaler>(
    vs: &BTreeMap<String, M>,
) -> impl FnMut(&mut dyn MapEncoder) + '_ {
    move |me: &mut dyn MapEncoder| {
        for (k, v) in vs {
            me.map_set_fields(k, v);
        }
    }
}
