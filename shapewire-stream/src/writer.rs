//! Typed event writer.

use crate::error::StreamError;
use crate::event::EventMarshaler;
use crate::signer::{system_clock, Clock, MessageSigner, StreamSigner};
use shapewire_eventstream::{message_types, names, Encoder, Message};
use shapewire_protocol::PayloadMarshaler;
use tracing::trace;

/// Marshals events into messages and writes them to an [`Encoder`].
///
/// Each written message carries `:message-type: event` and the event's
/// `:event-type`. With a signer attached, each message is also signed in
/// place before encoding.
pub struct EventWriter<E> {
    encoder: E,
    payload_marshaler: Box<dyn PayloadMarshaler>,
    signer: Option<MessageSigner<Box<dyn StreamSigner>>>,
    clock: Clock,
}

impl<E> EventWriter<E>
where
    E: Encoder,
    StreamError: From<E::Error>,
{
    pub fn new(encoder: E, payload_marshaler: impl PayloadMarshaler + 'static) -> Self {
        Self {
            encoder,
            payload_marshaler: Box::new(payload_marshaler),
            signer: None,
            clock: system_clock(),
        }
    }

    /// Signs every message with `signer` before it is encoded.
    pub fn with_signer(mut self, signer: impl StreamSigner + 'static) -> Self {
        self.signer = Some(MessageSigner::new(Box::new(signer)));
        self
    }

    /// Replaces the clock used for signing timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the message for `event` without writing it.
    pub fn marshal(&self, event: &dyn EventMarshaler) -> Result<Message, StreamError> {
        let mut msg = event.marshal_event(&*self.payload_marshaler)?;
        if msg.headers.get(names::MESSAGE_TYPE).is_none() {
            msg.headers.set(names::MESSAGE_TYPE, message_types::EVENT);
        }
        msg.headers.set(names::EVENT_TYPE, event.event_type());
        Ok(msg)
    }

    /// Writes one event. Fails if the event does not marshal, signing fails,
    /// or the encoder cannot write.
    pub fn write_event(&mut self, event: &dyn EventMarshaler) -> Result<(), StreamError> {
        let mut msg = self.marshal(event)?;
        if let Some(signer) = self.signer.as_mut() {
            signer.sign_message(&mut msg, (self.clock)())?;
        }
        self.encoder.encode(&msg)?;
        trace!(
            event_type = event.event_type(),
            payload_len = msg.payload.len(),
            "wrote event"
        );
        Ok(())
    }

    /// Closes the underlying encoder, letting it write any trailer.
    pub fn close(&mut self) -> Result<(), StreamError> {
        self.encoder.close()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &E {
        &self.encoder
    }

    pub fn into_inner(self) -> E {
        self.encoder
    }
}
