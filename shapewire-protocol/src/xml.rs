//! XML body encoding.
//!
//! Elements are always written with explicit end tags (`<a></a>`). Lists wrap
//! members in `<member>` unless flattened or given a custom member name; maps
//! wrap entries in `<entry><key/><value/></entry>` unless flattened.

use crate::encode::{FieldEncoder, FieldMarshaler, ListEncoder, MapEncoder, StreamMarshaler};
use crate::error::{FirstError, ProtocolError};
use crate::target::{Metadata, Target};
use crate::value::{FieldBuffer, Value};
use bytes::Bytes;

/// Appends `text` with XML character escaping.
fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

/// Encodes a shape as an XML fragment. Accepts `Body` and `Payload` targets.
#[derive(Debug, Default)]
pub struct XmlEncoder {
    buf: String,
    field_buf: FieldBuffer,
    err: FirstError,
}

impl XmlEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marshals `m` as a standalone document.
    pub fn encode_fields(m: &dyn FieldMarshaler) -> Result<Option<Bytes>, ProtocolError> {
        let mut e = Self::new();
        let result = m.marshal_fields(&mut e);
        e.err.record_result(result);
        e.encode()
    }

    /// Returns the encoded body, or `None` when nothing was written.
    pub fn encode(self) -> Result<Option<Bytes>, ProtocolError> {
        self.err.into_result()?;
        if self.buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(Bytes::from(self.buf)))
    }

    pub(crate) fn take_error(&mut self) -> Option<ProtocolError> {
        self.err.take()
    }

    fn start_elem(&mut self, name: &str, meta: &Metadata) {
        self.buf.push('<');
        self.buf.push_str(name);
        for attr in &meta.attributes {
            self.buf.push(' ');
            self.buf.push_str(&attr.name);
            self.buf.push_str("=\"");
            escape_into(&mut self.buf, &attr.value.marshal_value());
            self.buf.push('"');
        }
        if let Some(uri) = &meta.xml_namespace_uri {
            self.buf.push_str(" xmlns");
            if let Some(prefix) = meta.xml_namespace_prefix.as_deref().filter(|p| !p.is_empty()) {
                self.buf.push(':');
                self.buf.push_str(prefix);
            }
            self.buf.push_str("=\"");
            escape_into(&mut self.buf, uri);
            self.buf.push('"');
        }
        self.buf.push('>');
    }

    fn end_elem(&mut self, name: &str) {
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push('>');
    }

    fn add_value(&mut self, name: &str, v: &Value, meta: &Metadata) {
        self.start_elem(name, meta);
        let text = self.field_buf.get_value(v);
        match std::str::from_utf8(text) {
            Ok(s) => escape_into(&mut self.buf, s),
            Err(_) => self
                .err
                .record(ProtocolError::InvalidUtf8(format!("value for element {:?}", name))),
        }
        self.end_elem(name);
    }

    fn add_fields(&mut self, name: &str, m: &dyn FieldMarshaler, meta: &Metadata) {
        self.start_elem(name, meta);
        let result = m.marshal_fields(&mut *self);
        self.err.record_result(result);
        self.end_elem(name);
    }

    fn check_target(&mut self, op: &'static str, t: Target, k: &str) -> bool {
        if self.err.is_set() {
            return false;
        }
        match t {
            Target::Body | Target::Payload => true,
            _ => {
                self.err
                    .record(ProtocolError::unsupported_target("xml", op, t, k));
                false
            }
        }
    }
}

impl FieldEncoder for XmlEncoder {
    fn set_value(&mut self, t: Target, k: &str, v: &Value, meta: &Metadata) {
        if self.check_target("set_value", t, k) {
            self.add_value(k, v, meta);
        }
    }

    fn set_stream(&mut self, t: Target, k: &str, _v: &dyn StreamMarshaler, _meta: &Metadata) {
        self.err
            .record(ProtocolError::unsupported_target("xml", "set_stream", t, k));
    }

    fn set_list(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn ListEncoder),
        meta: &Metadata,
    ) {
        if !self.check_target("set_list", t, k) {
            return;
        }
        let member = match &meta.list_location_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ if meta.flatten => k.to_string(),
            _ => "member".to_string(),
        };

        if !meta.flatten {
            self.start_elem(k, meta);
        }
        let mut le = XmlListEncoder {
            base: &mut *self,
            member,
        };
        f(&mut le);
        if !meta.flatten {
            self.end_elem(k);
        }
    }

    fn set_map(
        &mut self,
        t: Target,
        k: &str,
        f: &mut dyn FnMut(&mut dyn MapEncoder),
        meta: &Metadata,
    ) {
        if !self.check_target("set_map", t, k) {
            return;
        }
        self.start_elem(k, meta);
        let mut me = XmlMapEncoder {
            base: &mut *self,
            flatten: meta.flatten,
            key_name: non_empty(&meta.map_location_name_key).unwrap_or("key"),
            value_name: non_empty(&meta.map_location_name_value).unwrap_or("value"),
        };
        f(&mut me);
        self.end_elem(k);
    }

    fn set_fields(&mut self, t: Target, k: &str, m: &dyn FieldMarshaler, meta: &Metadata) {
        if self.check_target("set_fields", t, k) {
            self.add_fields(k, m, meta);
        }
    }
}

fn non_empty(name: &Option<String>) -> Option<&str> {
    name.as_deref().filter(|n| !n.is_empty())
}

/// List member encoder for [`XmlEncoder`].
pub struct XmlListEncoder<'a> {
    base: &'a mut XmlEncoder,
    member: String,
}

impl ListEncoder for XmlListEncoder<'_> {
    fn list_add_value(&mut self, v: &Value) {
        if self.base.err.is_set() {
            return;
        }
        self.base.add_value(&self.member, v, &Metadata::default());
    }

    fn list_add_list(&mut self, _f: &mut dyn FnMut(&mut dyn ListEncoder)) {
        self.base
            .err
            .record(ProtocolError::unsupported_shape("xml", "list of list", &self.member));
    }

    fn list_add_map(&mut self, _f: &mut dyn FnMut(&mut dyn MapEncoder)) {
        self.base
            .err
            .record(ProtocolError::unsupported_shape("xml", "list of map", &self.member));
    }

    fn list_add_fields(&mut self, m: &dyn FieldMarshaler) {
        if self.base.err.is_set() {
            return;
        }
        self.base.add_fields(&self.member, m, &Metadata::default());
    }
}

/// Map entry encoder for [`XmlEncoder`].
pub struct XmlMapEncoder<'a> {
    base: &'a mut XmlEncoder,
    flatten: bool,
    key_name: &'a str,
    value_name: &'a str,
}

impl XmlMapEncoder<'_> {
    fn entry(&mut self, k: &str, write_value: impl FnOnce(&mut XmlEncoder, &str)) {
        if self.base.err.is_set() {
            return;
        }
        if !self.flatten {
            self.base.start_elem("entry", &Metadata::default());
        }
        self.base
            .add_value(self.key_name, &Value::from(k), &Metadata::default());
        write_value(&mut *self.base, self.value_name);
        if !self.flatten {
            self.base.end_elem("entry");
        }
    }
}

impl MapEncoder for XmlMapEncoder<'_> {
    fn map_set_value(&mut self, k: &str, v: &Value) {
        self.entry(k, |base, value_name| {
            base.add_value(value_name, v, &Metadata::default())
        });
    }

    fn map_set_list(&mut self, k: &str, _f: &mut dyn FnMut(&mut dyn ListEncoder)) {
        self.base
            .err
            .record(ProtocolError::unsupported_shape("xml", "map of list", k));
    }

    fn map_set_map(&mut self, k: &str, _f: &mut dyn FnMut(&mut dyn MapEncoder)) {
        self.base
            .err
            .record(ProtocolError::unsupported_shape("xml", "map of map", k));
    }

    fn map_set_fields(&mut self, k: &str, m: &dyn FieldMarshaler) {
        self.entry(k, |base, value_name| {
            base.add_fields(value_name, m, &Metadata::default())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode_fields_list, encode_fields_map, encode_value_list};
    use crate::target::XmlAttribute;
    use std::collections::BTreeMap;

    struct Nested {
        value: &'static str,
    }

    impl FieldMarshaler for Nested {
        fn marshal_fields(&self, e: &mut dyn FieldEncoder) -> Result<(), ProtocolError> {
            e.set_value(Target::Body, "value", &Value::from(self.value), &Metadata::default());
            Ok(())
        }
    }

    /// Wraps the shape under test in a `<payload>` element.
    struct Payload<F: Fn(&mut dyn FieldEncoder)>(F, Metadata);

    impl<F: Fn(&mut dyn FieldEncoder)> FieldMarshaler for Payload<F> {
        fn marshal_fields(&self, e: &mut dyn FieldEncoder) -> Result<(), ProtocolError> {
            struct Inner<'a, F>(&'a F);
            impl<F: Fn(&mut dyn FieldEncoder)> FieldMarshaler for Inner<'_, F> {
                fn marshal_fields(&self, e: &mut dyn FieldEncoder) -> Result<(), ProtocolError> {
                    (self.0)(e);
                    Ok(())
                }
            }
            e.set_fields(Target::Payload, "payload", &Inner(&self.0), &self.1);
            Ok(())
        }
    }

    fn encode_payload(f: impl Fn(&mut dyn FieldEncoder)) -> String {
        encode_payload_with(f, Metadata::default())
    }

    fn encode_payload_with(f: impl Fn(&mut dyn FieldEncoder), meta: Metadata) -> String {
        let body = XmlEncoder::encode_fields(&Payload(f, meta)).unwrap().unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn single(k: &str, v: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(k.to_string(), v.to_string());
        map
    }

    fn nested_map() -> BTreeMap<String, Nested> {
        let mut map = BTreeMap::new();
        map.insert("abc".to_string(), Nested { value: "1" });
        map
    }

    #[test]
    fn test_attribute() {
        let out = encode_payload_with(
            |_| {},
            Metadata::new().with_attribute(XmlAttribute::new("attrkey", "value")),
        );
        assert_eq!(out, r#"<payload attrkey="value"></payload>"#);
    }

    #[test]
    fn test_namespace() {
        let out = encode_payload(|e| {
            e.set_fields(
                Target::Body,
                "namespace",
                &Nested { value: "abc" },
                &Metadata::new().with_namespace(Some("prefix"), "https://example.com"),
            )
        });
        assert_eq!(
            out,
            r#"<payload><namespace xmlns:prefix="https://example.com"><value>abc</value></namespace></payload>"#
        );
    }

    #[test]
    fn test_nested_shape() {
        let out = encode_payload(|e| {
            e.set_fields(Target::Body, "nested", &Nested { value: "expected value" }, &Metadata::default())
        });
        assert_eq!(out, "<payload><nested><value>expected value</value></nested></payload>");
    }

    #[test]
    fn test_maps() {
        let map = single("abc", "123");
        let cases = [
            (
                "mapstr",
                Metadata::default(),
                "<payload><mapstr><entry><key>abc</key><value>123</value></entry></mapstr></payload>",
            ),
            (
                "mapFlatten",
                Metadata::new().flatten(),
                "<payload><mapFlatten><key>abc</key><value>123</value></mapFlatten></payload>",
            ),
            (
                "mapNamed",
                Metadata::new().with_map_names("namedKey", "namedValue"),
                "<payload><mapNamed><entry><namedKey>abc</namedKey><namedValue>123</namedValue></entry></mapNamed></payload>",
            ),
        ];
        for (name, meta, expect) in cases {
            let out = encode_payload(|e| {
                e.set_map(Target::Body, name, &mut crate::encode::encode_value_map(&map), &meta)
            });
            assert_eq!(out, expect, "{}", name);
        }
    }

    #[test]
    fn test_map_shapes() {
        let map = nested_map();
        let cases = [
            (
                "mapShape",
                Metadata::default(),
                "<payload><mapShape><entry><key>abc</key><value><value>1</value></value></entry></mapShape></payload>",
            ),
            (
                "mapFlattenShape",
                Metadata::new().flatten(),
                "<payload><mapFlattenShape><key>abc</key><value><value>1</value></value></mapFlattenShape></payload>",
            ),
            (
                "mapNamedShape",
                Metadata::new().with_map_names("namedKey", "namedValue"),
                "<payload><mapNamedShape><entry><namedKey>abc</namedKey><namedValue><value>1</value></namedValue></entry></mapNamedShape></payload>",
            ),
        ];
        for (name, meta, expect) in cases {
            let out = encode_payload(|e| {
                e.set_map(Target::Body, name, &mut encode_fields_map(&map), &meta)
            });
            assert_eq!(out, expect, "{}", name);
        }
    }

    #[test]
    fn test_lists() {
        let values = ["abc", "123"];
        let cases = [
            (
                "liststr",
                Metadata::default(),
                "<payload><liststr><member>abc</member><member>123</member></liststr></payload>",
            ),
            (
                "listFlatten",
                Metadata::new().flatten(),
                "<payload><listFlatten>abc</listFlatten><listFlatten>123</listFlatten></payload>",
            ),
            (
                "listNamed",
                Metadata::new().with_list_name("namedMember"),
                "<payload><listNamed><namedMember>abc</namedMember><namedMember>123</namedMember></listNamed></payload>",
            ),
        ];
        for (name, meta, expect) in cases {
            let out = encode_payload(|e| {
                e.set_list(Target::Body, name, &mut encode_value_list(&values), &meta)
            });
            assert_eq!(out, expect, "{}", name);
        }
    }

    #[test]
    fn test_list_shapes() {
        let shapes = [Nested { value: "abc" }, Nested { value: "123" }];
        let cases = [
            (
                "listShape",
                Metadata::default(),
                "<payload><listShape><member><value>abc</value></member><member><value>123</value></member></listShape></payload>",
            ),
            (
                "listFlattenShape",
                Metadata::new().flatten(),
                "<payload><listFlattenShape><value>abc</value></listFlattenShape><listFlattenShape><value>123</value></listFlattenShape></payload>",
            ),
            (
                "listNamedShape",
                Metadata::new().with_list_name("namedMember"),
                "<payload><listNamedShape><namedMember><value>abc</value></namedMember><namedMember><value>123</value></namedMember></listNamedShape></payload>",
            ),
        ];
        for (name, meta, expect) in cases {
            let out = encode_payload(|e| {
                e.set_list(Target::Body, name, &mut encode_fields_list(&shapes), &meta)
            });
            assert_eq!(out, expect, "{}", name);
        }
    }

    #[test]
    fn test_text_escaping() {
        let out = encode_payload(|e| {
            e.set_value(Target::Body, "v", &Value::from("a<b & \"c\"\n"), &Metadata::default())
        });
        assert_eq!(out, "<payload><v>a&lt;b &amp; &#34;c&#34;&#xA;</v></payload>");
    }

    #[test]
    fn test_nested_collections_rejected() {
        let mut e = XmlEncoder::new();
        e.set_list(
            Target::Body,
            "grid",
            &mut |le| le.list_add_list(&mut |_| {}),
            &Metadata::default(),
        );
        assert!(e.encode().unwrap_err().is_shape_error());

        let mut e = XmlEncoder::new();
        e.set_list(
            Target::Body,
            "rows",
            &mut |le| le.list_add_map(&mut |_| {}),
            &Metadata::default(),
        );
        assert!(e.encode().unwrap_err().is_shape_error());
    }

    #[test]
    fn test_rejects_header_target_and_empty_is_none() {
        let mut e = XmlEncoder::new();
        e.set_value(Target::Header, "x", &Value::from("1"), &Metadata::default());
        assert!(e.encode().unwrap_err().is_shape_error());

        assert_eq!(XmlEncoder::new().encode().unwrap(), None);
    }
}
