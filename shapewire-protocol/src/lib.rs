//! # shapewire-protocol
//!
//! Format-agnostic field marshaling for API request and response shapes.
//!
//! This crate provides:
//! - Typed wire values with canonical text forms (strings, numbers, timestamps, blobs)
//! - The [`Target`] enum naming where a field lives in an HTTP exchange
//! - [`FieldEncoder`] / [`FieldDecoder`] traits and their list/map companions
//! - Query, JSON, XML and REST encoders, plus REST-XML and REST-JSON composites
//! - JSON and REST field decoders
//! - Payload codecs used by the EventStream layer

pub mod decode;
pub mod encode;
pub mod error;
pub mod header;
pub mod json;
pub mod path;
pub mod payload;
pub mod query;
pub mod rest;
pub mod restjson;
pub mod restxml;
pub mod target;
pub mod value;
pub mod xml;

pub use decode::{FieldDecoder, FieldUnmarshaler, ListDecoder, MapDecoder};
pub use encode::{FieldEncoder, FieldMarshaler, ListEncoder, MapEncoder, StreamMarshaler};
pub use error::{FirstError, ProtocolError};
pub use json::{JsonDecoder, JsonEncoder};
pub use payload::{JsonPayloadCodec, PayloadMarshaler, PayloadUnmarshaler, XmlPayloadMarshaler};
pub use query::{QueryEncoder, QueryValues};
pub use rest::{BodyEncoder, EncodedRequest, RestBodyEncoder, RestDecoder, RestEncoder};
pub use restjson::{RestJsonDecoder, RestJsonEncoder};
pub use restxml::RestXmlEncoder;
pub use target::{Metadata, Target, XmlAttribute};
pub use value::{BytesStream, FieldBuffer, StringStream, TimeFormat, TimeValue, Value, ValueKind};
pub use xml::XmlEncoder;
