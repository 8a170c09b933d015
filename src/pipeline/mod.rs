//! Generation → transport → verification pipeline
//!
//! One blocking [`GeneratorWorker`] per length range feeds its own bounded
//! channel. A single [`Dispatcher`] drains all channels and fans candidates out
//! to verifiers. The [`TerminationController`] decides how the run ends and
//! broadcasts cancellation exactly once.

pub mod channel;
pub mod dispatcher;
pub mod termination;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use termination::{RunSnapshot, TerminationController};
pub use worker::GeneratorWorker;

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::{CheckMode, SearchConfig};
use crate::error::{KeyforgeError, Result};
use crate::metrics::{RunStats, StatsSnapshot};
use crate::types::{Charset, SearchReport, WorkerSummary};
use crate::verify::{
    CheckService, ConcurrencyLimiter, HttpCheckService, Md5CheckService, Verifier,
};

/// A configured search, ready to run
pub struct Search {
    config: SearchConfig,
    charset: Charset,
    service: Arc<dyn CheckService>,
}

impl Search {
    /// Validate the configuration; every error here is fatal
    pub fn new(config: SearchConfig, service: Arc<dyn CheckService>) -> Result<Self> {
        config.validate()?;
        let charset = Charset::parse(&config.charset)?;
        Ok(Self {
            config,
            charset,
            service,
        })
    }

    /// Search against the HTTP service at `config.base_url`, in `config.mode`
    pub fn with_http(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        let http: Arc<dyn CheckService> = Arc::new(HttpCheckService::new(
            config.base_url.clone(),
            config.request_timeout,
            config.max_concurrency,
        )?);
        let service: Arc<dyn CheckService> = match config.mode {
            CheckMode::Remote => http,
            CheckMode::Md5 => Arc::new(Md5CheckService::new(http)),
        };
        Self::new(config, service)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run to completion; `interrupt` is the operator's cancel signal
    pub async fn run(&self, interrupt: CancellationToken) -> Result<SearchReport> {
        self.run_with_progress(interrupt, |_| {}).await
    }

    /// Run to completion, calling `on_progress` every `progress_interval`
    pub async fn run_with_progress<F>(
        &self,
        interrupt: CancellationToken,
        on_progress: F,
    ) -> Result<SearchReport>
    where
        F: Fn(&StatsSnapshot) + Send + Sync + 'static,
    {
        let started_at = Utc::now();
        let stats = Arc::new(RunStats::new());
        let controller = Arc::new(TerminationController::new());
        let limiter = ConcurrencyLimiter::new(self.config.max_concurrency)?;
        let verifier = Arc::new(Verifier::new(
            Arc::clone(&self.service),
            limiter,
            self.config.retry_budget,
            self.config.request_timeout,
            Arc::clone(&stats),
        ));

        tokio::select! {
            biased;
            _ = interrupt.cancelled() => {
                controller.cancel("operator interrupt");
            }
            prepared = self.prepare_service() => prepared?,
        }

        let ranges = self.config.length_range().partition(self.config.workers);
        let capacity =
            channel::capacity_in_batches(self.config.channel_capacity, self.config.batch_size);
        tracing::info!(
            charset = %self.charset,
            lengths = %self.config.length_range(),
            workers = ranges.len(),
            channel_capacity = capacity,
            max_concurrency = self.config.max_concurrency,
            "Starting search"
        );

        let mut receivers = Vec::with_capacity(ranges.len());
        let mut workers = Vec::with_capacity(ranges.len());
        for (id, range) in ranges.into_iter().enumerate() {
            let (tx, rx) = channel::transport(id, capacity)?;
            let worker = GeneratorWorker::new(
                range,
                self.charset.clone(),
                self.config.batch_size,
                tx,
                Arc::clone(&controller),
                Arc::clone(&stats),
            );
            workers.push(worker.spawn());
            receivers.push(rx);
        }

        let dispatcher = Dispatcher::new(
            receivers,
            verifier,
            Arc::clone(&controller),
            Arc::clone(&stats),
            self.config.max_pending,
        );
        let mut dispatch = tokio::spawn(dispatcher.run());
        let progress = spawn_progress(
            Arc::clone(&stats),
            controller.token(),
            self.config.progress_interval,
            on_progress,
        );

        let token = controller.token();
        let mut dispatch_done = false;
        tokio::select! {
            biased;
            joined = &mut dispatch => {
                dispatch_done = true;
                if let Err(e) = joined {
                    controller.cancel(format!("dispatcher failed: {}", e));
                }
            }
            _ = interrupt.cancelled() => {
                controller.cancel("operator interrupt");
            }
            _ = token.cancelled() => {}
        }

        if controller.outcome().is_pending() {
            controller.cancel("pipeline stopped without a result");
        }

        let (summaries, abandoned_workers) = self.shutdown(dispatch, dispatch_done, workers).await;
        if let Some(progress) = progress {
            progress.abort();
        }

        let snapshot = stats.snapshot();
        let outcome = controller.outcome();
        tracing::info!(
            outcome = %outcome,
            checks = snapshot.checks_issued,
            rejected = snapshot.rejected,
            unknown = snapshot.unknown,
            abandoned_workers = abandoned_workers,
            elapsed_ms = snapshot.elapsed_ms,
            "Search finished"
        );

        Ok(SearchReport {
            outcome,
            stats: snapshot,
            workers: summaries,
            abandoned_workers,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Run the service's setup, then log its target; only setup errors are fatal
    async fn prepare_service(&self) -> Result<()> {
        tracing::info!(
            mode = %self.config.mode,
            base_url = %self.config.base_url,
            "Preparing service"
        );
        timeout(self.config.request_timeout, self.service.prepare())
            .await
            .map_err(|_| {
                KeyforgeError::transient("Timed out preparing verification service", None, None)
            })??;

        match timeout(self.config.request_timeout, self.service.fetch_target()).await {
            Ok(Ok(target)) => tracing::info!(target_descriptor = %target, "Fetched target"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Could not fetch target descriptor"),
            Err(_) => tracing::warn!("Timed out fetching target descriptor"),
        }
        Ok(())
    }

    /// Wait for the dispatcher and workers, abandoning whatever outlives the shutdown timeout
    ///
    /// Returns the summaries of the workers that joined and the number abandoned.
    async fn shutdown(
        &self,
        mut dispatch: JoinHandle<usize>,
        dispatch_done: bool,
        workers: Vec<JoinHandle<WorkerSummary>>,
    ) -> (Vec<WorkerSummary>, usize) {
        let deadline = Instant::now() + self.config.shutdown_timeout;

        if !dispatch_done {
            match timeout_at(deadline, &mut dispatch).await {
                Ok(Ok(drained)) => tracing::debug!(drained = drained, "Dispatcher stopped"),
                Ok(Err(e)) => tracing::error!(error = %e, "Dispatcher failed during shutdown"),
                Err(_) => {
                    tracing::warn!("Dispatcher did not stop within shutdown timeout, aborting");
                    dispatch.abort();
                }
            }
        }

        let results = join_all(workers.into_iter().map(|h| timeout_at(deadline, h))).await;
        let mut summaries = Vec::with_capacity(results.len());
        let mut abandoned = 0;
        for (id, result) in results.into_iter().enumerate() {
            match result {
                Ok(Ok(summary)) => {
                    tracing::debug!(
                        worker = summary.worker,
                        cancelled = summary.cancelled,
                        "Worker joined"
                    );
                    summaries.push(summary);
                }
                Ok(Err(e)) => tracing::error!(worker = id, error = %e, "Worker failed"),
                // Blocking threads cannot be killed; without a receiver it exits at its next batch
                Err(_) => {
                    tracing::warn!(
                        worker = id,
                        "Worker did not stop within shutdown timeout, abandoning"
                    );
                    abandoned += 1;
                }
            }
        }
        (summaries, abandoned)
    }
}

fn spawn_progress<F>(
    stats: Arc<RunStats>,
    token: CancellationToken,
    interval: Duration,
    on_progress: F,
) -> Option<JoinHandle<()>>
where
    F: Fn(&StatsSnapshot) + Send + Sync + 'static,
{
    if interval.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = stats.snapshot();
                    tracing::info!(
                        generated = snapshot.candidates_generated,
                        resolved = snapshot.resolved(),
                        unknown = snapshot.unknown,
                        rate = format_args!("{:.0}/s", snapshot.checks_per_second),
                        "Progress"
                    );
                    on_progress(&snapshot);
                }
            }
        }
    }))
}
