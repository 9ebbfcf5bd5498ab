//! JSON debug view of messages, used for message logging and the `dump`
//! command.

use crate::error::EventStreamError;
use crate::header::{HeaderValue, Headers};
use crate::message::{Message, MessageView};
use crate::MIN_MESSAGE_LEN;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Serialize)]
struct DebugMessage<'a> {
    total_length: usize,
    headers_length: usize,
    headers: Vec<DebugHeader<'a>>,
    payload: String,
}

#[derive(Serialize)]
struct DebugHeader<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    value: JsonValue,
}

fn header_json(value: &HeaderValue) -> JsonValue {
    match value {
        HeaderValue::Bool(v) => JsonValue::from(*v),
        HeaderValue::Byte(v) => JsonValue::from(*v),
        HeaderValue::Int16(v) => JsonValue::from(*v),
        HeaderValue::Int32(v) => JsonValue::from(*v),
        HeaderValue::Int64(v) => JsonValue::from(*v),
        HeaderValue::Bytes(v) => JsonValue::from(STANDARD.encode(v)),
        HeaderValue::String(v) => JsonValue::from(v.as_str()),
        HeaderValue::Timestamp(v) => {
            JsonValue::from(v.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        HeaderValue::Uuid(v) => JsonValue::from(v.to_string()),
    }
}

/// Renders a message as a single JSON object. Header values keep their type
/// name; bytes values and the payload are base64.
pub fn to_debug_json(headers: &Headers, payload: &[u8]) -> Result<String, EventStreamError> {
    let headers_length = headers.encode()?.len();
    let msg = DebugMessage {
        total_length: MIN_MESSAGE_LEN + headers_length + payload.len(),
        headers_length,
        headers: headers
            .iter()
            .map(|h| DebugHeader {
                name: &h.name,
                kind: h.value.header_type().as_str(),
                value: header_json(&h.value),
            })
            .collect(),
        payload: STANDARD.encode(payload),
    };
    Ok(serde_json::to_string(&msg)?)
}

impl Message {
    pub fn to_debug_json(&self) -> Result<String, EventStreamError> {
        to_debug_json(&self.headers, &self.payload)
    }
}

impl MessageView<'_> {
    pub fn to_debug_json(&self) -> Result<String, EventStreamError> {
        to_debug_json(&self.headers, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::DateTime;

    #[test]
    fn test_debug_json_shape() {
        let mut headers = Headers::new();
        headers.set(":event-type", "eventABC");
        headers.set("flag", true);
        headers.set("sig", Bytes::from_static(b"\x01\x02"));
        headers.set(":date", DateTime::from_timestamp_millis(1_000_500).unwrap());
        let msg = Message::new(headers, Bytes::from_static(b"hi"));

        let json: JsonValue = serde_json::from_str(&msg.to_debug_json().unwrap()).unwrap();
        assert_eq!(json["payload"], "aGk=");
        assert_eq!(json["total_length"], msg.encode().unwrap().len());
        assert_eq!(json["headers"][0]["name"], ":event-type");
        assert_eq!(json["headers"][0]["type"], "string");
        assert_eq!(json["headers"][0]["value"], "eventABC");
        assert_eq!(json["headers"][1]["type"], "bool");
        assert_eq!(json["headers"][1]["value"], true);
        assert_eq!(json["headers"][2]["value"], "AQI=");
        assert_eq!(json["headers"][3]["value"], "1970-01-01T00:16:40.500Z");
    }
}
