//! Generator worker: one thread per length range

use std::sync::Arc;
use tokio::task::JoinHandle;

use super::channel::BatchSender;
use super::termination::TerminationController;
use crate::generator;
use crate::metrics::RunStats;
use crate::types::{Batch, Charset, LengthRange, SearchSpace, WorkerSummary};

/// Generates every candidate for its lengths and pushes them to the dispatcher
pub struct GeneratorWorker {
    id: usize,
    range: LengthRange,
    charset: Charset,
    batch_size: usize,
    sender: BatchSender,
    controller: Arc<TerminationController>,
    stats: Arc<RunStats>,
}

impl GeneratorWorker {
    pub fn new(
        range: LengthRange,
        charset: Charset,
        batch_size: usize,
        sender: BatchSender,
        controller: Arc<TerminationController>,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            id: sender.worker(),
            range,
            charset,
            batch_size,
            sender,
            controller,
            stats,
        }
    }

    /// Run on the blocking thread pool
    pub fn spawn(self) -> JoinHandle<WorkerSummary> {
        tokio::task::spawn_blocking(move || self.run())
    }

    /// Generate and send until done or cancelled; blocks the calling thread
    pub fn run(self) -> WorkerSummary {
        let token = self.controller.token();
        let mut summary = WorkerSummary {
            worker: self.id,
            ..Default::default()
        };

        self.controller.worker_started();
        tracing::info!(worker = self.id, range = %self.range, "Worker started");

        'lengths: for length in self.range.lengths() {
            let space = SearchSpace::new(self.charset.clone(), length);
            let mut batches = generator::batches(&space, self.batch_size);

            tracing::info!(
                worker = self.id,
                length = length,
                combinations = %space
                    .combination_count()
                    .map_or_else(|| "overflow".to_string(), |c| c.to_string()),
                batch_size = batches.batch_size(),
                "Generating length"
            );

            loop {
                if token.is_cancelled() {
                    summary.cancelled = true;
                    break 'lengths;
                }

                let Some(candidates) = batches.next() else {
                    break;
                };
                let count = candidates.len() as u64;
                self.stats.add_candidates_generated(count);

                if token.is_cancelled() {
                    summary.cancelled = true;
                    break 'lengths;
                }

                let batch = Batch {
                    worker: self.id,
                    length,
                    candidates,
                };
                if let Err(e) = self.sender.send_blocking(batch) {
                    tracing::debug!(worker = self.id, reason = %e, "Dispatcher released channel");
                    summary.cancelled = true;
                    break 'lengths;
                }

                summary.batches_sent += 1;
                summary.candidates_sent += count;
            }

            summary.lengths_completed += 1;
        }

        tracing::info!(
            worker = self.id,
            lengths_completed = summary.lengths_completed,
            candidates_sent = summary.candidates_sent,
            cancelled = summary.cancelled,
            "Worker finished"
        );

        self.sender.close();
        self.controller.worker_finished();
        summary
    }
}
