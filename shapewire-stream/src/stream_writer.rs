//! Concurrent event sending.
//!
//! A [`StreamWriter`] owns an [`EventWriter`] on a dedicated blocking task.
//! Callers enqueue events through a bounded channel and wait for the worker to
//! report the outcome of their write over a oneshot channel, so messages reach
//! the encoder whole and in queue order.

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::event::EventMarshaler;
use crate::writer::EventWriter;
use parking_lot::Mutex;
use shapewire_eventstream::Encoder;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct WriteRequest {
    event: Box<dyn EventMarshaler>,
    result: oneshot::Sender<Result<(), StreamError>>,
}

type SharedError = Arc<Mutex<Option<Arc<StreamError>>>>;

/// Serializes events from many concurrent senders onto one [`EventWriter`].
///
/// The first failed write poisons the writer: the failing `send` gets the
/// error, [`StreamWriter::err`] keeps returning it, and every later `send`
/// fails with [`StreamError::Closed`] without touching the encoder.
///
/// Must be created inside a tokio runtime.
pub struct StreamWriter {
    tx: Mutex<Option<mpsc::Sender<WriteRequest>>>,
    done: CancellationToken,
    err: SharedError,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl StreamWriter {
    pub fn new<E>(writer: EventWriter<E>) -> Self
    where
        E: Encoder + Send + 'static,
        StreamError: From<E::Error>,
    {
        Self::with_config(writer, &StreamConfig::default())
    }

    /// Uses `config.send_queue_capacity` as the depth of the send queue.
    pub fn with_config<E>(writer: EventWriter<E>, config: &StreamConfig) -> Self
    where
        E: Encoder + Send + 'static,
        StreamError: From<E::Error>,
    {
        let (tx, rx) = mpsc::channel(config.send_queue_capacity.max(1));
        let done = CancellationToken::new();
        let err: SharedError = Arc::new(Mutex::new(None));

        let worker = {
            let done = done.clone();
            let err = err.clone();
            tokio::task::spawn_blocking(move || run_worker(writer, rx, done, err))
        };

        Self {
            tx: Mutex::new(Some(tx)),
            done,
            err,
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    /// Sends one event and waits until it has been written.
    ///
    /// `cancel` aborts the wait. A cancelled send whose event was already
    /// queued may still be written; it is never written partially.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        event: impl EventMarshaler + 'static,
    ) -> Result<(), StreamError> {
        if self.err.lock().is_some() {
            return Err(StreamError::Closed);
        }
        let tx = self.tx.lock().clone().ok_or(StreamError::Closed)?;

        let (result_tx, result_rx) = oneshot::channel();
        let request = WriteRequest {
            event: Box::new(event),
            result: result_tx,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            _ = self.done.cancelled() => return Err(StreamError::Closed),
            sent = tx.send(request) => sent.map_err(|_| StreamError::Closed)?,
        }
        drop(tx);

        // Once queued, only the worker decides the outcome. A dropped result
        // sender means the worker stopped before reaching this request.
        tokio::select! {
            biased;
            result = result_rx => result.unwrap_or(Err(StreamError::Closed)),
            _ = cancel.cancelled() => Err(StreamError::Cancelled),
        }
    }

    /// The error that poisoned the writer, if any.
    pub fn err(&self) -> Option<Arc<StreamError>> {
        self.err.lock().clone()
    }

    /// Stops the worker and closes the encoder. Safe to call more than once
    /// and concurrently with `send`; later calls wait for the first to finish.
    ///
    /// Returns the poisoning error if the writer failed.
    pub async fn close(&self) -> Result<(), StreamError> {
        self.tx.lock().take();
        self.done.cancel();

        let mut worker = self.worker.lock().await;
        if let Some(handle) = worker.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "stream writer worker failed");
            }
            debug!("stream writer closed");
        }

        match self.err() {
            Some(e) => Err(StreamError::Write(e)),
            None => Ok(()),
        }
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        self.done.cancel();
        self.tx.lock().take();
    }
}

fn run_worker<E>(
    mut writer: EventWriter<E>,
    mut rx: mpsc::Receiver<WriteRequest>,
    done: CancellationToken,
    err: SharedError,
) where
    E: Encoder,
    StreamError: From<E::Error>,
{
    debug!("stream writer worker started");

    while let Some(request) = rx.blocking_recv() {
        if done.is_cancelled() {
            let _ = request.result.send(Err(StreamError::Closed));
            break;
        }

        match writer.write_event(&*request.event) {
            Ok(()) => {
                let _ = request.result.send(Ok(()));
            }
            Err(e) => {
                let e = Arc::new(e);
                warn!(error = %e, "event write failed, stream writer poisoned");
                *err.lock() = Some(e.clone());
                let _ = request.result.send(Err(StreamError::Write(e)));
                return;
            }
        }
    }

    if let Err(e) = writer.close() {
        warn!(error = %e, "closing event encoder failed");
        *err.lock() = Some(Arc::new(e));
    }
    debug!("stream writer worker stopped");
}
