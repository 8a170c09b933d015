//! Dispatcher: pulls batches from every worker and fans candidates out to verifiers

use std::future::poll_fn;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use super::channel::BatchReceiver;
use super::termination::TerminationController;
use crate::metrics::RunStats;
use crate::types::{Batch, VerificationOutcome};
use crate::verify::Verifier;

/// Single logical consumer of all transport channels
///
/// Channels are serviced round-robin. Verification tasks run on a `JoinSet`
/// bounded by `max_pending`; the dispatcher reaps finished tasks before it
/// spawns past that bound.
pub struct Dispatcher {
    channels: Vec<BatchReceiver>,
    cursor: usize,
    verifier: Arc<Verifier>,
    controller: Arc<TerminationController>,
    stats: Arc<RunStats>,
    max_pending: usize,
}

impl Dispatcher {
    pub fn new(
        channels: Vec<BatchReceiver>,
        verifier: Arc<Verifier>,
        controller: Arc<TerminationController>,
        stats: Arc<RunStats>,
        max_pending: usize,
    ) -> Self {
        for channel in &channels {
            controller.channel_opened(channel.worker());
        }

        Self {
            channels,
            cursor: 0,
            verifier,
            controller,
            stats,
            max_pending: max_pending.max(1),
        }
    }

    /// Number of channels still open
    pub fn open_channels(&self) -> usize {
        self.channels.len()
    }

    /// Next batch from any channel, or `None` once every channel is closed and drained
    pub async fn next_batch(&mut self) -> Option<Batch> {
        poll_fn(|cx| self.poll_next_batch(cx)).await
    }

    fn poll_next_batch(&mut self, cx: &mut Context<'_>) -> Poll<Option<Batch>> {
        loop {
            let open = self.channels.len();
            if open == 0 {
                return Poll::Ready(None);
            }

            let mut closed = None;
            for offset in 0..open {
                let idx = (self.cursor + offset) % open;
                match self.channels[idx].poll_recv(cx) {
                    Poll::Ready(Some(batch)) => {
                        self.cursor = idx + 1;
                        return Poll::Ready(Some(batch));
                    }
                    Poll::Ready(None) => {
                        closed = Some(idx);
                        break;
                    }
                    Poll::Pending => {}
                }
            }

            match closed {
                Some(idx) => {
                    let channel = self.channels.remove(idx);
                    self.cursor = idx;
                    self.controller.channel_drained(channel.worker());
                    tracing::debug!(
                        worker = channel.worker(),
                        remaining = self.channels.len(),
                        "Transport channel drained"
                    );
                }
                None => return Poll::Pending,
            }
        }
    }

    /// Dispatch until every channel is drained or the run is cancelled
    ///
    /// Returns the number of channels that were fully drained. Signals
    /// exhaustion to the controller only when all of them were.
    pub async fn run(mut self) -> usize {
        let token = self.controller.token();
        let total_channels = self.channels.len();
        let mut inflight: JoinSet<()> = JoinSet::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    reap(joined);
                    continue;
                }
                next = self.next_batch() => next,
            };

            let Some(batch) = next else {
                break;
            };
            self.stats.increment_batches_received();
            tracing::trace!(
                worker = batch.worker,
                length = batch.length,
                size = batch.len(),
                "Batch received"
            );

            let mut candidates = batch.candidates.into_iter();
            while let Some(candidate) = candidates.next() {
                if token.is_cancelled() {
                    self.stats.add_skipped(1 + candidates.len() as u64);
                    break;
                }

                while inflight.len() >= self.max_pending {
                    match inflight.join_next().await {
                        Some(joined) => reap(joined),
                        None => break,
                    }
                }

                inflight.spawn(verify_candidate(
                    candidate,
                    Arc::clone(&self.verifier),
                    Arc::clone(&self.controller),
                    Arc::clone(&self.stats),
                    token.clone(),
                ));
            }
        }

        let still_open = self.channels.len();
        // Releasing the receivers unblocks any worker stuck on a full channel
        self.channels.clear();

        while let Some(joined) = inflight.join_next().await {
            reap(joined);
        }

        if still_open == 0 {
            self.controller.report_exhausted();
        } else {
            tracing::info!(
                open_channels = still_open,
                "Dispatcher stopped before channels drained"
            );
        }

        total_channels - still_open
    }
}

async fn verify_candidate(
    candidate: String,
    verifier: Arc<Verifier>,
    controller: Arc<TerminationController>,
    stats: Arc<RunStats>,
    token: CancellationToken,
) {
    match verifier.verify(&candidate, &token).await {
        Ok(VerificationOutcome::Accepted) => {
            stats.increment_accepted();
            controller.report_found(&candidate);
        }
        Ok(VerificationOutcome::Rejected) => stats.increment_rejected(),
        Ok(outcome) => {
            stats.increment_unknown();
            tracing::warn!(
                candidate = %candidate,
                outcome = %outcome,
                "Candidate could not be verified"
            );
        }
        Err(e) => {
            stats.add_skipped(1);
            tracing::trace!(candidate = %candidate, reason = %e, "Verification skipped");
        }
    }
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "Verification task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::pipeline::channel::transport;
    use crate::types::{CheckVerdict, RunOutcome};
    use crate::verify::{CheckService, ConcurrencyLimiter};
    use async_trait::async_trait;
    use std::time::Duration;

    struct AcceptOne(&'static str);

    #[async_trait]
    impl CheckService for AcceptOne {
        async fn fetch_target(&self) -> Result<String> {
            Ok(String::new())
        }

        async fn check(&self, candidate: &str) -> Result<CheckVerdict> {
            if candidate == self.0 {
                Ok(CheckVerdict::Success)
            } else {
                Ok(CheckVerdict::Failure)
            }
        }
    }

    fn batch(worker: usize, tag: &str) -> Batch {
        Batch {
            worker,
            length: tag.len(),
            candidates: vec![tag.to_string()],
        }
    }

    fn dispatcher(
        channels: Vec<BatchReceiver>,
        accept: &'static str,
        controller: Arc<TerminationController>,
        stats: Arc<RunStats>,
    ) -> Dispatcher {
        let verifier = Arc::new(Verifier::new(
            Arc::new(AcceptOne(accept)),
            ConcurrencyLimiter::new(4).unwrap(),
            3,
            Duration::from_secs(5),
            Arc::clone(&stats),
        ));
        Dispatcher::new(channels, verifier, controller, stats, 8)
    }

    #[tokio::test]
    async fn test_round_robin_across_channels() {
        let (tx0, rx0) = transport(0, 8).unwrap();
        let (tx1, rx1) = transport(1, 8).unwrap();
        for i in 0..3 {
            tx0.send(batch(0, &format!("a{}", i))).await.unwrap();
            tx1.send(batch(1, &format!("b{}", i))).await.unwrap();
        }
        tx0.close();
        tx1.close();

        let controller = Arc::new(TerminationController::new());
        let stats = Arc::new(RunStats::new());
        let mut dispatcher = dispatcher(vec![rx0, rx1], "", controller.clone(), stats);

        let mut order = Vec::new();
        while let Some(b) = dispatcher.next_batch().await {
            order.push(b.candidates[0].clone());
        }
        assert_eq!(order, vec!["a0", "b0", "a1", "b1", "a2", "b2"]);
        assert_eq!(dispatcher.open_channels(), 0);
        assert!(controller.snapshot().active_channels.is_empty());
    }

    #[tokio::test]
    async fn test_busy_channel_does_not_starve_quiet_one() {
        let (tx0, rx0) = transport(0, 16).unwrap();
        let (tx1, rx1) = transport(1, 16).unwrap();
        for i in 0..10 {
            tx0.send(batch(0, &format!("a{}", i))).await.unwrap();
        }
        tx1.send(batch(1, "quiet")).await.unwrap();

        let controller = Arc::new(TerminationController::new());
        let mut dispatcher = dispatcher(vec![rx0, rx1], "", controller, Arc::new(RunStats::new()));

        let first = dispatcher.next_batch().await.unwrap();
        let second = dispatcher.next_batch().await.unwrap();
        assert_eq!(first.worker, 0);
        assert_eq!(second.candidates[0], "quiet");
        drop((tx0, tx1));
    }

    #[tokio::test]
    async fn test_run_exhausts_when_nothing_accepted() {
        let (tx, rx) = transport(0, 8).unwrap();
        tx.send(Batch {
            worker: 0,
            length: 1,
            candidates: (0..20).map(|i| i.to_string()).collect(),
        })
        .await
        .unwrap();
        tx.close();

        let controller = Arc::new(TerminationController::new());
        let stats = Arc::new(RunStats::new());
        let drained = dispatcher(vec![rx], "nope", controller.clone(), stats.clone())
            .run()
            .await;

        assert_eq!(drained, 1);
        assert_eq!(controller.outcome(), RunOutcome::Exhausted);
        assert_eq!(stats.snapshot().rejected, 20);
    }

    #[tokio::test]
    async fn test_run_stops_on_accept() {
        let (tx, rx) = transport(0, 8).unwrap();
        tx.send(batch(0, "miss")).await.unwrap();
        tx.send(batch(0, "hit")).await.unwrap();
        // Sender stays open: only the accept can end the run

        let controller = Arc::new(TerminationController::new());
        let stats = Arc::new(RunStats::new());
        let drained = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher(vec![rx], "hit", controller.clone(), stats.clone()).run(),
        )
        .await
        .unwrap();

        assert_eq!(drained, 0);
        assert_eq!(controller.outcome(), RunOutcome::Found("hit".to_string()));
        assert_eq!(stats.snapshot().accepted, 1);
        // Receiver was released
        assert!(tx.send(batch(0, "late")).await.is_err());
    }
}
