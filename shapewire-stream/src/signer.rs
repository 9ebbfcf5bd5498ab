//! Chunk signing for outgoing event streams.
//!
//! A signed message carries a `:date` timestamp header and a
//! `:chunk-signature` bytes header. The signature covers the encoded header
//! block (with `:date`, without the signature), the payload and the date.
//! How signatures are computed is up to the [`StreamSigner`].

use crate::error::StreamError;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use shapewire_eventstream::{names, BufferEncoder, Encoder, Headers, Message};
use tracing::{debug, trace};

/// Computes chunk signatures.
pub trait StreamSigner: Send {
    fn get_signature(
        &mut self,
        headers: &[u8],
        payload: &[u8],
        date: DateTime<Utc>,
    ) -> Result<Vec<u8>, StreamError>;
}

impl<S: StreamSigner + ?Sized> StreamSigner for Box<S> {
    fn get_signature(
        &mut self,
        headers: &[u8],
        payload: &[u8],
        date: DateTime<Utc>,
    ) -> Result<Vec<u8>, StreamError> {
        (**self).get_signature(headers, payload, date)
    }
}

/// Source of signing timestamps.
pub type Clock = Box<dyn FnMut() -> DateTime<Utc> + Send>;

pub fn system_clock() -> Clock {
    Box::new(Utc::now)
}

/// Signs messages in place.
pub struct MessageSigner<S> {
    signer: S,
}

impl<S: StreamSigner> MessageSigner<S> {
    pub fn new(signer: S) -> Self {
        Self { signer }
    }

    /// Sets `:date`, signs the result and appends `:chunk-signature`.
    pub fn sign_message(&mut self, msg: &mut Message, date: DateTime<Utc>) -> Result<(), StreamError> {
        msg.headers.set(names::DATE, date);
        let headers = msg.headers.encode()?;
        let signature = self.signer.get_signature(&headers, &msg.payload, date)?;
        msg.headers
            .set(names::CHUNK_SIGNATURE, bytes::Bytes::from(signature));
        Ok(())
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }
}

/// Wraps every message in a signed envelope before handing it to the inner
/// encoder.
///
/// The envelope's payload is the complete encoded inner message, so the
/// receiver sees a stream of signed envelopes and decodes each payload again.
/// [`Encoder::close`] writes a final envelope with an empty payload, once.
pub struct SignEncoder<E, S> {
    inner: E,
    signer: MessageSigner<S>,
    clock: Clock,
    scratch: BufferEncoder,
    closed: bool,
}

impl<E, S> SignEncoder<E, S>
where
    E: Encoder,
    S: StreamSigner,
    StreamError: From<E::Error>,
{
    pub fn new(inner: E, signer: S) -> Self {
        Self {
            inner,
            signer: MessageSigner::new(signer),
            clock: system_clock(),
            scratch: BufferEncoder::new(),
            closed: false,
        }
    }

    /// Replaces the clock used to stamp `:date`.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn write_envelope(&mut self, payload: bytes::Bytes) -> Result<(), StreamError> {
        let date = (self.clock)();
        let mut envelope = Message::new(Headers::new(), payload);
        self.signer.sign_message(&mut envelope, date)?;
        trace!(date = %date, payload_len = envelope.payload.len(), "signed event stream envelope");
        self.inner.encode(&envelope)?;
        Ok(())
    }

    pub fn get_ref(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E, S> Encoder for SignEncoder<E, S>
where
    E: Encoder,
    S: StreamSigner,
    StreamError: From<E::Error>,
{
    type Error = StreamError;

    fn encode(&mut self, msg: &Message) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.scratch.encode(msg)?;
        let payload = self.scratch.take();
        self.write_envelope(payload)
    }

    fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("writing end of stream envelope");
        self.write_envelope(bytes::Bytes::new())?;
        self.inner.close()?;
        Ok(())
    }
}

/// Chains signatures with keyed SHA-256: each signature covers the previous
/// one, so messages cannot be reordered or dropped without detection.
///
/// ```text
/// sig[n] = SHA256(key || sig[n-1] || date_millis_be || SHA256(headers) || SHA256(payload))
/// ```
///
/// This is a self-contained scheme for tests and local tooling; it does not
/// interoperate with any cloud provider's request signing.
#[derive(Clone)]
pub struct ChainedSigner {
    key: Vec<u8>,
    prev: Vec<u8>,
}

impl ChainedSigner {
    /// Creates a signer seeded with the signature that precedes the stream,
    /// typically the signature of the request that opened it.
    pub fn new(key: impl Into<Vec<u8>>, seed: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            prev: seed.into(),
        }
    }

    /// Creates a signer from a hex encoded seed signature.
    pub fn from_hex_seed(key: impl Into<Vec<u8>>, seed: &str) -> Result<Self, StreamError> {
        let seed = hex::decode(seed)
            .map_err(|e| StreamError::Signing(format!("invalid seed signature: {e}")))?;
        Ok(Self::new(key, seed))
    }

    /// The most recent signature, or the seed before anything was signed.
    pub fn last_signature(&self) -> &[u8] {
        &self.prev
    }

    pub fn last_signature_hex(&self) -> String {
        hex::encode(&self.prev)
    }

    /// Computes the signature that would follow `prev` without advancing the
    /// chain. Receivers use this to verify what they read.
    pub fn compute(
        key: &[u8],
        prev: &[u8],
        headers: &[u8],
        payload: &[u8],
        date: DateTime<Utc>,
    ) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update(prev);
        hasher.update(date.timestamp_millis().to_be_bytes());
        hasher.update(Sha256::digest(headers));
        hasher.update(Sha256::digest(payload));
        hasher.finalize().to_vec()
    }
}

impl std::fmt::Debug for ChainedSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedSigner")
            .field("key", &"<redacted>")
            .field("prev", &hex::encode(&self.prev))
            .finish()
    }
}

impl StreamSigner for ChainedSigner {
    fn get_signature(
        &mut self,
        headers: &[u8],
        payload: &[u8],
        date: DateTime<Utc>,
    ) -> Result<Vec<u8>, StreamError> {
        let sig = Self::compute(&self.key, &self.prev, headers, payload, date);
        trace!(prev = %hex::encode(&self.prev), next = %hex::encode(&sig), "chained signature");
        self.prev.clone_from(&sig);
        Ok(sig)
    }
}
