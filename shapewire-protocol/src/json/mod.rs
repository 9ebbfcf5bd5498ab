//! JSON body encoding and decoding.

mod decode;
mod encode;

pub use decode::JsonDecoder;
pub use encode::{JsonEncoder, JsonWriter};
