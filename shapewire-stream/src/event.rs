//! Event marshaling contracts.
//!
//! Generated event types implement [`EventMarshaler`] to be written and
//! [`EventUnmarshaler`] to be read. Most events are a plain shape carried as the
//! message payload; [`shape_event_message`] and [`unmarshal_shape_event`]
//! cover that case.

use crate::error::StreamError;
use shapewire_eventstream::{message_types, names, Headers, Message, MessageView};
use shapewire_protocol::{FieldMarshaler, FieldUnmarshaler, PayloadMarshaler, PayloadUnmarshaler};

/// An event that can be written to a stream.
pub trait EventMarshaler: Send {
    /// Name stamped into the `:event-type` header.
    fn event_type(&self) -> &str;

    fn marshal_event(&self, pm: &dyn PayloadMarshaler) -> Result<Message, StreamError>;
}

/// An event that can be populated from a stream message.
///
/// `msg.payload` borrows the reader's buffer; implementations must copy out
/// anything they keep.
pub trait EventUnmarshaler {
    fn unmarshal_event(
        &mut self,
        pu: &dyn PayloadUnmarshaler,
        msg: &MessageView<'_>,
    ) -> Result<(), StreamError>;
}

impl<E: EventMarshaler + ?Sized> EventMarshaler for Box<E> {
    fn event_type(&self) -> &str {
        (**self).event_type()
    }

    fn marshal_event(&self, pm: &dyn PayloadMarshaler) -> Result<Message, StreamError> {
        (**self).marshal_event(pm)
    }
}

/// Builds an event message whose payload is `shape`.
pub fn shape_event_message(
    pm: &dyn PayloadMarshaler,
    shape: &dyn FieldMarshaler,
) -> Result<Message, StreamError> {
    let mut headers = Headers::new();
    headers.set(names::MESSAGE_TYPE, message_types::EVENT);
    let payload = pm.marshal_payload(shape)?;
    Ok(Message::new(headers, payload))
}

/// Populates `shape` from an event message payload.
pub fn unmarshal_shape_event(
    pu: &dyn PayloadUnmarshaler,
    msg: &MessageView<'_>,
    shape: &mut dyn FieldUnmarshaler,
) -> Result<(), StreamError> {
    pu.unmarshal_payload(msg.payload, shape)?;
    Ok(())
}
