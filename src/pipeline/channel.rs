//! Bounded worker → dispatcher transport

use std::task::{Context, Poll};
use tokio::sync::{mpsc, Semaphore};

use crate::error::{KeyforgeError, Result};
use crate::types::Batch;

/// Create a transport channel holding at most `capacity` batches
pub fn transport(worker: usize, capacity: usize) -> Result<(BatchSender, BatchReceiver)> {
    if capacity == 0 {
        return Err(KeyforgeError::resource_exhaustion(
            "Transport channel",
            "capacity is zero",
        ));
    }
    if capacity > Semaphore::MAX_PERMITS {
        return Err(KeyforgeError::resource_exhaustion(
            "Transport channel",
            format!("capacity exceeds {} batches", Semaphore::MAX_PERMITS),
        ));
    }

    let (tx, rx) = mpsc::channel(capacity);
    Ok((BatchSender { worker, tx }, BatchReceiver { worker, rx }))
}

/// Channel capacity in batches for a capacity expressed in candidates
pub fn capacity_in_batches(candidate_capacity: usize, batch_size: usize) -> usize {
    (candidate_capacity / batch_size.max(1)).max(1)
}

/// Producer half, owned by one generator worker
#[derive(Debug)]
pub struct BatchSender {
    worker: usize,
    tx: mpsc::Sender<Batch>,
}

impl BatchSender {
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Block the calling thread until the batch is queued
    ///
    /// Fails with `ChannelClosed` once the dispatcher has released the
    /// receiver. Must not be called from inside the async runtime.
    pub fn send_blocking(&self, batch: Batch) -> Result<()> {
        self.tx
            .blocking_send(batch)
            .map_err(|_| KeyforgeError::channel_closed(self.worker))
    }

    /// Async counterpart of [`send_blocking`](Self::send_blocking)
    pub async fn send(&self, batch: Batch) -> Result<()> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| KeyforgeError::channel_closed(self.worker))
    }

    /// Signal end-of-stream; batches already sent are still delivered
    pub fn close(self) {
        tracing::debug!(worker = self.worker, "Closing transport channel");
    }
}

/// Consumer half, owned by the dispatcher
#[derive(Debug)]
pub struct BatchReceiver {
    worker: usize,
    rx: mpsc::Receiver<Batch>,
}

impl BatchReceiver {
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Next batch, or `None` once the sender closed and everything was drained
    pub async fn recv(&mut self) -> Option<Batch> {
        self.rx.recv().await
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Batch>> {
        self.rx.poll_recv(cx)
    }
}
