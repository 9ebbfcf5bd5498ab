//! REST-XML: REST path/query/header placement with an XML body.

use crate::rest::RestBodyEncoder;
use crate::xml::XmlEncoder;

pub type RestXmlEncoder = RestBodyEncoder<XmlEncoder>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode_value_list, FieldEncoder, FieldMarshaler};
    use crate::error::ProtocolError;
    use crate::target::{Metadata, Target};
    use crate::value::{BytesStream, Value};
    use bytes::Bytes;
    use http::Method;
    use std::cell::Cell;

    struct Tagging {
        tags: Vec<&'static str>,
    }

    impl FieldMarshaler for Tagging {
        fn marshal_fields(&self, e: &mut dyn FieldEncoder) -> Result<(), ProtocolError> {
            e.set_list(
                Target::Body,
                "TagSet",
                &mut encode_value_list(&self.tags),
                &Metadata::new().with_list_name("Tag"),
            );
            Ok(())
        }
    }

    struct PutTagging {
        bucket: &'static str,
        tagging: Tagging,
    }

    impl FieldMarshaler for PutTagging {
        fn marshal_fields(&self, e: &mut dyn FieldEncoder) -> Result<(), ProtocolError> {
            e.set_value(Target::Path, "Bucket", &Value::from(self.bucket), &Metadata::default());
            e.set_value(Target::Query, "tagging", &Value::from(""), &Metadata::new().no_value());
            e.set_fields(
                Target::Payload,
                "Tagging",
                &self.tagging,
                &Metadata::new().with_namespace(None, "http://s3.amazonaws.com/doc/2006-03-01/"),
            );
            Ok(())
        }
    }

    #[test]
    fn test_payload_shape_becomes_root_element() {
        let input = PutTagging {
            bucket: "photos",
            tagging: Tagging {
                tags: vec!["a", "b"],
            },
        };
        let req = RestXmlEncoder::encode_fields(Method::PUT, "/{Bucket}", &input).unwrap();

        assert_eq!(req.uri(), "/photos?tagging");
        assert_eq!(
            req.body.unwrap(),
            Bytes::from_static(
                br#"<Tagging xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><TagSet><Tag>a</Tag><Tag>b</Tag></TagSet></Tagging>"#
            )
        );
    }

    struct Upload {
        with_body_field: bool,
    }

    impl FieldMarshaler for Upload {
        fn marshal_fields(&self, e: &mut dyn FieldEncoder) -> Result<(), ProtocolError> {
            e.set_stream(
                Target::Payload,
                "Body",
                &BytesStream(Bytes::from_static(b"\x00\x01")),
                &Metadata::default(),
            );
            if self.with_body_field {
                e.set_value(Target::Body, "Extra", &Value::from("x"), &Metadata::default());
            }
            Ok(())
        }
    }

    #[test]
    fn test_stream_payload_passes_through() {
        let req = RestXmlEncoder::encode_fields(
            Method::PUT,
            "/",
            &Upload {
                with_body_field: false,
            },
        )
        .unwrap();
        assert_eq!(req.body.as_deref(), Some(&b"\x00\x01"[..]));
    }

    #[test]
    fn test_xml_body_and_stream_conflict() {
        let err = RestXmlEncoder::encode_fields(
            Method::PUT,
            "/",
            &Upload {
                with_body_field: true,
            },
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::BodyPayloadConflict { body: "XML" }));
    }

    #[test]
    fn test_get_body_list_goes_to_query() {
        let req = RestXmlEncoder::encode_fields(
            Method::GET,
            "/tags",
            &Tagging {
                tags: vec!["x", "y"],
            },
        )
        .unwrap();
        assert!(req.body.is_none());
        assert_eq!(req.uri(), "/tags?TagSet=x&TagSet=y");
    }

    #[derive(Default)]
    struct Failing {
        calls: Cell<usize>,
    }

    impl FieldMarshaler for Failing {
        fn marshal_fields(&self, _e: &mut dyn FieldEncoder) -> Result<(), ProtocolError> {
            self.calls.set(self.calls.get() + 1);
            Err(ProtocolError::Marshal("boom-first".into()))
        }
    }

    #[test]
    fn test_xml_body_error_wins_over_later_rest_error() {
        let failing = Failing::default();
        let meta = Metadata::default();
        let mut e = RestXmlEncoder::new(Method::PUT, "/{Bucket}");
        e.set_fields(Target::Payload, "Tagging", &failing, &meta);
        e.set_value(Target::Header, "bad header", &Value::from("v"), &meta);
        e.set_fields(Target::Body, "Again", &failing, &meta);

        let err = e.encode().unwrap_err();
        assert!(matches!(err, ProtocolError::Marshal(ref msg) if msg == "boom-first"));
        assert_eq!(failing.calls.get(), 1);
    }

    #[test]
    fn test_xml_rest_error_wins_over_later_body_error() {
        let failing = Failing::default();
        let meta = Metadata::default();
        let mut e = RestXmlEncoder::new(Method::PUT, "/{Bucket}");
        e.set_value(Target::Header, "bad header", &Value::from("v"), &meta);
        e.set_fields(Target::Payload, "Tagging", &failing, &meta);

        let err = e.encode().unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidHeader { .. }));
        assert_eq!(failing.calls.get(), 0);
    }
}
