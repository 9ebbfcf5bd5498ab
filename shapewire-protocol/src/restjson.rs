//! REST-JSON: REST path/query/header placement with a JSON body.

use crate::decode::FieldUnmarshaler;
use crate::error::{FirstError, ProtocolError};
use crate::json::{JsonDecoder, JsonEncoder};
use crate::rest::{RestBodyEncoder, RestDecoder};
use bytes::Bytes;
use http::HeaderMap;

pub type RestJsonEncoder = RestBodyEncoder<JsonEncoder>;

/// Decodes REST-JSON responses: headers and raw payloads through
/// [`RestDecoder`], `Body` and nested `Payload` shapes through
/// [`JsonDecoder`].
#[derive(Debug, Clone)]
pub struct RestJsonDecoder {
    rest: RestDecoder,
    json: JsonDecoder,
}

impl RestJsonDecoder {
    /// Parses the body as JSON. An empty body is an empty object.
    ///
    /// Responses whose payload is a raw blob are not JSON and should be read
    /// with [`RestDecoder`] instead.
    pub fn new(headers: HeaderMap, body: Bytes) -> Result<Self, ProtocolError> {
        let json = JsonDecoder::new(&body)?;
        Ok(Self {
            rest: RestDecoder::new(headers, body),
            json,
        })
    }

    /// Unmarshals `m`. Header and body reads share one error slot, so the
    /// first failure in call order is returned and later reads are skipped.
    pub fn decode(&self, m: &mut dyn FieldUnmarshaler) -> Result<(), ProtocolError> {
        let mut err = FirstError::new();
        let mut reader = self.rest.reader(&mut err, Some(&self.json));
        let result = m.unmarshal_fields(&mut reader);
        err.record_result(result);
        err.into_result()
    }
}
