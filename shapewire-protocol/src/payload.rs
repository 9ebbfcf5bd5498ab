//! Whole-payload codecs used when a shape is carried as an opaque message
//! body, e.g. an EventStream event.

use crate::decode::FieldUnmarshaler;
use crate::encode::FieldMarshaler;
use crate::error::ProtocolError;
use crate::json::{JsonDecoder, JsonEncoder};
use crate::xml::XmlEncoder;
use bytes::Bytes;

/// Serializes a shape into a payload.
pub trait PayloadMarshaler: Send + Sync {
    fn marshal_payload(&self, m: &dyn FieldMarshaler) -> Result<Bytes, ProtocolError>;
}

/// Populates a shape from a payload.
pub trait PayloadUnmarshaler: Send + Sync {
    fn unmarshal_payload(
        &self,
        payload: &[u8],
        m: &mut dyn FieldUnmarshaler,
    ) -> Result<(), ProtocolError>;
}

/// JSON payloads in both directions. A shape with no members marshals to an
/// empty payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadCodec;

impl PayloadMarshaler for JsonPayloadCodec {
    fn marshal_payload(&self, m: &dyn FieldMarshaler) -> Result<Bytes, ProtocolError> {
        Ok(JsonEncoder::encode_fields(m)?.unwrap_or_default())
    }
}

impl PayloadUnmarshaler for JsonPayloadCodec {
    fn unmarshal_payload(
        &self,
        payload: &[u8],
        m: &mut dyn FieldUnmarshaler,
    ) -> Result<(), ProtocolError> {
        JsonDecoder::new(payload)?.decode(m)
    }
}

/// XML payloads, encode only.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlPayloadMarshaler;

impl PayloadMarshaler for XmlPayloadMarshaler {
    fn marshal_payload(&self, m: &dyn FieldMarshaler) -> Result<Bytes, ProtocolError> {
        Ok(XmlEncoder::encode_fields(m)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{decode_into, FieldDecoder};
    use crate::encode::FieldEncoder;
    use crate::target::{Metadata, Target};
    use crate::value::{Value, ValueKind};

    #[derive(Debug, Default, PartialEq)]
    struct Record {
        id: Option<i64>,
        note: Option<String>,
    }

    impl FieldMarshaler for Record {
        fn marshal_fields(&self, e: &mut dyn FieldEncoder) -> Result<(), ProtocolError> {
            if let Some(id) = self.id {
                e.set_value(Target::Body, "Id", &Value::Int64(id), &Metadata::default());
            }
            if let Some(note) = &self.note {
                e.set_value(Target::Body, "Note", &Value::from(note), &Metadata::default());
            }
            Ok(())
        }
    }

    impl FieldUnmarshaler for Record {
        fn unmarshal_fields(&mut self, d: &mut dyn FieldDecoder) -> Result<(), ProtocolError> {
            d.get(Target::Body, "Id", ValueKind::Int64, &mut decode_into(&mut self.id), &Metadata::default());
            d.get(Target::Body, "Note", ValueKind::String, &mut decode_into(&mut self.note), &Metadata::default());
            Ok(())
        }
    }

    #[test]
    fn test_json_payload_round_trip() {
        let record = Record {
            id: Some(9),
            note: Some("<hi>".into()),
        };
        let payload = JsonPayloadCodec.marshal_payload(&record).unwrap();
        assert_eq!(&payload[..], br#"{"Id":9,"Note":"<hi>"}"#);

        let mut decoded = Record::default();
        JsonPayloadCodec.unmarshal_payload(&payload, &mut decoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_empty_shape_is_empty_payload() {
        let payload = JsonPayloadCodec.marshal_payload(&Record::default()).unwrap();
        assert!(payload.is_empty());

        let mut decoded = Record::default();
        JsonPayloadCodec.unmarshal_payload(&payload, &mut decoded).unwrap();
        assert_eq!(decoded, Record::default());
    }

    #[test]
    fn test_xml_payload() {
        let record = Record {
            id: Some(1),
            note: Some("a&b".into()),
        };
        let payload = XmlPayloadMarshaler.marshal_payload(&record).unwrap();
        assert_eq!(&payload[..], b"<Id>1</Id><Note>a&amp;b</Note>");
    }
}
