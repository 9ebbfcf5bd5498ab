//! # shapewire-stream
//!
//! Typed event streaming on top of the EventStream message codec.
//!
//! This crate provides:
//! - [`EventReader`]: decodes messages and dispatches them to event unmarshalers
//!   by their `:event-type` header
//! - [`EventWriter`]: marshals events into messages, optionally signing them
//! - [`StreamWriter`]: a concurrent, cancellable front end to a single
//!   background event writer
//! - [`SignEncoder`] and [`MessageSigner`]: chunk signing with pluggable
//!   [`StreamSigner`]s
//! - [`StreamConfig`]: queue sizes and decoder settings

pub mod config;
pub mod error;
pub mod event;
pub mod reader;
pub mod signer;
pub mod stream_writer;
pub mod writer;

pub use config::{ConfigError, StreamConfig};
pub use error::StreamError;
pub use event::{EventMarshaler, EventUnmarshaler};
pub use reader::{get_event_type, EventReader, EventStream};
pub use signer::{system_clock, ChainedSigner, Clock, MessageSigner, SignEncoder, StreamSigner};
pub use stream_writer::StreamWriter;
pub use writer::EventWriter;
