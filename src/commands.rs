//! Command execution.

use bytes::Bytes;
use shapewire_eventstream::{Decoder, Encoder, EventStreamError, Headers, Message, WriteEncoder};
use shapewire_stream::{ChainedSigner, SignEncoder, StreamConfig, StreamError};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// CLI failures.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{path}: {err}", path = .0.display(), err = .1)]
    Open(PathBuf, #[source] io::Error),

    #[error("message {index}: {source}")]
    Message {
        index: usize,
        #[source]
        source: EventStreamError,
    },

    #[error("invalid header {0:?}, expected name=value")]
    InvalidHeader(String),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Codec(#[from] EventStreamError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Options for writing a single message.
#[derive(Debug, Default)]
pub struct EncodeOptions {
    pub event_type: String,
    pub headers: Vec<String>,
    pub payload: Option<String>,
    pub sign_key: Option<String>,
}

fn open_decoder(path: &Path, config: &StreamConfig) -> Result<Decoder<BufReader<File>>, CliError> {
    let file = File::open(path).map_err(|e| CliError::Open(path.to_path_buf(), e))?;
    Ok(Decoder::with_capacity(BufReader::new(file), config.read_buffer_size)
        .with_message_logging(config.log_messages))
}

/// Prints every message in a capture as one JSON line. Returns the number of
/// messages printed.
pub fn dump(
    path: &Path,
    pretty: bool,
    config: &StreamConfig,
    out: &mut impl Write,
) -> Result<usize, CliError> {
    let mut decoder = open_decoder(path, config)?;
    let mut count = 0;
    loop {
        let view = match decoder.decode() {
            Ok(Some(view)) => view,
            Ok(None) => break,
            Err(source) => return Err(CliError::Message { index: count, source }),
        };
        let json = view.to_debug_json()?;
        if pretty {
            let value: serde_json::Value = serde_json::from_str(&json)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        } else {
            writeln!(out, "{json}")?;
        }
        count += 1;
    }
    Ok(count)
}

/// Checks every prelude and message checksum in a capture. Returns the
/// message count, or the first framing error with its message index.
pub fn verify(path: &Path, config: &StreamConfig) -> Result<usize, CliError> {
    let mut decoder = open_decoder(path, config)?;
    let mut count = 0;
    loop {
        match decoder.decode() {
            Ok(Some(_)) => count += 1,
            Ok(None) => return Ok(count),
            Err(source) => return Err(CliError::Message { index: count, source }),
        }
    }
}

/// Builds the message described by `opts`.
pub fn build_message(opts: &EncodeOptions) -> Result<Message, CliError> {
    let mut headers = Headers::new();
    headers.set(shapewire_eventstream::names::MESSAGE_TYPE, "event");
    headers.set(shapewire_eventstream::names::EVENT_TYPE, opts.event_type.as_str());
    for raw in &opts.headers {
        let (name, value) = raw
            .split_once('=')
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| CliError::InvalidHeader(raw.clone()))?;
        headers.set(name, value);
    }

    let payload = match opts.payload.as_deref() {
        Some(arg) => read_payload_arg(arg)?,
        None => Bytes::new(),
    };
    Ok(Message::new(headers, payload))
}

/// Writes one message to `out`. With a signing key, the message is wrapped
/// in a signed envelope and followed by the end-of-stream trailer. Returns
/// the number of bytes written.
pub fn encode(opts: &EncodeOptions, mut out: impl Write) -> Result<usize, CliError> {
    let msg = build_message(opts)?;
    let mut buf = Vec::with_capacity(msg.encoded_len());

    match opts.sign_key.as_deref() {
        None => {
            let mut encoder = WriteEncoder::new(&mut buf);
            encoder.encode(&msg)?;
        }
        Some(key) => {
            let key = hex::decode(key).map_err(|e| CliError::InvalidKey(e.to_string()))?;
            let signer = ChainedSigner::new(key, Vec::new());
            let mut encoder = SignEncoder::new(WriteEncoder::new(&mut buf), signer);
            encoder.encode(&msg)?;
            encoder.close()?;
        }
    }
    out.write_all(&buf)?;
    Ok(buf.len())
}

/// Reads a payload argument: inline text, or `@path` to read a file.
fn read_payload_arg(arg: &str) -> Result<Bytes, CliError> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read(path)
            .map(Bytes::from)
            .map_err(|e| CliError::Open(PathBuf::from(path), e)),
        None => Ok(Bytes::copy_from_slice(arg.as_bytes())),
    }
}
