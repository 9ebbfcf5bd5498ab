//! Field decoder interfaces, the structural mirror of [`crate::encode`].
//!
//! A decoder invokes the supplied continuation once per decoded value. Absent
//! fields never invoke it. Like encoders, decoders record the first error
//! and turn later calls into no-ops.

use crate::error::ProtocolError;
use crate::target::{Metadata, Target};
use crate::value::{Value, ValueKind};

/// Implemented by shapes that can populate themselves from a decoder.
pub trait FieldUnmarshaler {
    fn unmarshal_fields(&mut self, d: &mut dyn FieldDecoder) -> Result<(), ProtocolError>;
}

/// Reads list elements.
pub trait ListDecoder {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes `f` with each element decoded as `kind`.
    fn list_get(&mut self, kind: ValueKind, f: &mut dyn FnMut(Value));
    fn list_get_list(&mut self, f: &mut dyn FnMut(&mut dyn ListDecoder));
    fn list_get_map(&mut self, f: &mut dyn FnMut(&mut dyn MapDecoder));
    /// Invokes `f` with a field decoder positioned on each element.
    fn list_get_fields(
        &mut self,
        f: &mut dyn FnMut(&mut dyn FieldDecoder) -> Result<(), ProtocolError>,
    );
}

/// Reads map entries.
pub trait MapDecoder {
    fn keys(&self) -> Vec<String>;
    fn map_get(&mut self, k: &str, kind: ValueKind, f: &mut dyn FnMut(Value));
    fn map_get_list(&mut self, k: &str, f: &mut dyn FnMut(&mut dyn ListDecoder));
    fn map_get_map(&mut self, k: &str, f: &mut dyn FnMut(&mut dyn MapDecoder));
    fn map_get_fields(&mut self, k: &str, m: &mut dyn FieldUnmarshaler);
}

/// Reads a shape's members from the location named by each call's target.
pub trait FieldDecoder {
    fn get(&mut self, t: Target, k: &str, kind: ValueKind, f: &mut dyn FnMut(Value), meta: &Metadata);
    fn get_list(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn ListDecoder),
        meta: &Metadata,
    );
    fn get_map(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn MapDecoder),
        meta: &Metadata,
    );
    fn get_fields(&mut self, t: Target, k: &str, m: &mut dyn FieldUnmarshaler, meta: &Metadata);
}

/// Returns a continuation storing the decoded value into `dst`.
///
/// Decoders only hand out values of the requested kind, so a conversion
/// failure means the caller asked for one kind and converts to another;
/// such values are skipped.
pub fn decode_into<T>(dst: &mut Option<T>) -> impl FnMut(Value) + '_
where
    T: TryFrom<Value>,
{
    move |v| {
        if let Ok(v) = T::try_from(v) {
            *dst = Some(v);
        }
    }
}

/// Returns a continuation appending each decoded value to `dst`.
pub fn decode_push<T>(dst: &mut Vec<T>) -> impl FnMut(Value) + '_
where
    T: TryFrom<Value>,
{
    move |v| {
        if let Ok(v) = T::try_from(v) {
            dst.push(v);
        }
    }
}
