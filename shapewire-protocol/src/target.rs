//! Field placement targets and per-field metadata.

use crate::value::Value;
use std::fmt;

/// Where a field's value is written to, or read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Wire-format specific structured body.
    Body,
    /// Body replaced wholesale by a stream or a single nested structure.
    Payload,
    /// A single HTTP header.
    Header,
    /// A map flattened into prefixed HTTP headers.
    Headers,
    /// URI path segment substitution.
    Path,
    /// URL query parameter.
    Query,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Body => write!(f, "body"),
            Target::Payload => write!(f, "payload"),
            Target::Header => write!(f, "header"),
            Target::Headers => write!(f, "headers"),
            Target::Path => write!(f, "path"),
            Target::Query => write!(f, "query"),
        }
    }
}

/// An XML attribute attached to a field's opening element.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlAttribute {
    pub name: String,
    pub value: Value,
    pub meta: Metadata,
}

impl XmlAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            meta: Metadata::default(),
        }
    }
}

/// Per-field encoding configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Serialize list/map members without a wrapper element.
    pub flatten: bool,
    /// Custom element name for list members.
    pub list_location_name: Option<String>,
    /// Custom element name for map keys.
    pub map_location_name_key: Option<String>,
    /// Custom element name for map values.
    pub map_location_name_value: Option<String>,
    pub xml_namespace_prefix: Option<String>,
    pub xml_namespace_uri: Option<String>,
    pub attributes: Vec<XmlAttribute>,
    /// Emit the field name without a value (e.g. `?acl` query flags).
    pub no_value: bool,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flatten(mut self) -> Self {
        self.flatten = true;
        self
    }

    pub fn no_value(mut self) -> Self {
        self.no_value = true;
        self
    }

    pub fn with_list_name(mut self, name: impl Into<String>) -> Self {
        self.list_location_name = Some(name.into());
        self
    }

    pub fn with_map_names(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.map_location_name_key = Some(key.into());
        self.map_location_name_value = Some(value.into());
        self
    }

    pub fn with_namespace(mut self, prefix: Option<&str>, uri: impl Into<String>) -> Self {
        self.xml_namespace_prefix = prefix.map(str::to_string);
        self.xml_namespace_uri = Some(uri.into());
        self
    }

    pub fn with_attribute(mut self, attr: XmlAttribute) -> Self {
        self.attributes.push(attr);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_display() {
        assert_eq!(Target::Body.to_string(), "body");
        assert_eq!(Target::Headers.to_string(), "headers");
        assert_eq!(Target::Path.to_string(), "path");
    }

    #[test]
    fn test_metadata_builders() {
        let meta = Metadata::new()
            .flatten()
            .with_list_name("item")
            .with_namespace(Some("ns"), "https://example.com")
            .with_attribute(XmlAttribute::new("attr", "v"));

        assert!(meta.flatten);
        assert_eq!(meta.list_location_name.as_deref(), Some("item"));
        assert_eq!(meta.xml_namespace_prefix.as_deref(), Some("ns"));
        assert_eq!(meta.attributes.len(), 1);
        assert!(!meta.no_value);
    }
}
