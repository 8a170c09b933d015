//! Per-candidate verification with fail-fast retry

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::{CheckService, ConcurrencyLimiter};
use crate::error::{KeyforgeError, Result};
use crate::metrics::RunStats;
use crate::types::{CheckVerdict, VerificationOutcome};

/// Verifies single candidates against a [`CheckService`]
///
/// Every attempt holds one limiter permit for exactly its own duration.
/// Transient failures are retried immediately until the retry budget is
/// spent, then the candidate resolves to [`VerificationOutcome::Unknown`].
pub struct Verifier {
    service: Arc<dyn CheckService>,
    limiter: ConcurrencyLimiter,
    retry_budget: usize,
    request_timeout: Duration,
    stats: Arc<RunStats>,
}

impl Verifier {
    pub fn new(
        service: Arc<dyn CheckService>,
        limiter: ConcurrencyLimiter,
        retry_budget: usize,
        request_timeout: Duration,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            service,
            limiter,
            retry_budget: retry_budget.max(1),
            request_timeout,
            stats,
        }
    }

    /// Verify one candidate, returning a final outcome
    ///
    /// Returns [`KeyforgeError::Cancelled`] if the run ended before a request
    /// could be issued. A request already sent is allowed to finish.
    pub async fn verify(
        &self,
        candidate: &str,
        cancel: &CancellationToken,
    ) -> Result<VerificationOutcome> {
        for attempt in 1..=self.retry_budget {
            match self.attempt(candidate, cancel).await? {
                VerificationOutcome::Transient(cause) => {
                    self.stats.increment_transient_failures();
                    tracing::debug!(
                        candidate = %candidate,
                        attempt = attempt,
                        budget = self.retry_budget,
                        error = %cause,
                        "Transient verification failure"
                    );
                }
                outcome => return Ok(outcome),
            }
        }

        tracing::warn!(
            candidate = %candidate,
            attempts = self.retry_budget,
            "Retry budget exhausted, outcome unknown"
        );
        Ok(VerificationOutcome::Unknown)
    }

    async fn attempt(
        &self,
        candidate: &str,
        cancel: &CancellationToken,
    ) -> Result<VerificationOutcome> {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(KeyforgeError::cancelled("run finished")),
            permit = self.limiter.acquire() => permit?,
        };
        if cancel.is_cancelled() {
            return Err(KeyforgeError::cancelled("run finished"));
        }

        self.stats.increment_checks_issued();
        let response = timeout(self.request_timeout, self.service.check(candidate)).await;

        let outcome = match response {
            Ok(Ok(CheckVerdict::Success)) => VerificationOutcome::Accepted,
            Ok(Ok(CheckVerdict::Failure)) => VerificationOutcome::Rejected,
            Ok(Err(e)) if e.is_transient() => VerificationOutcome::Transient(e.to_string()),
            Ok(Err(e)) => {
                tracing::error!(
                    candidate = %candidate,
                    error = %e,
                    "Unusable verification response"
                );
                VerificationOutcome::Unknown
            }
            Err(_) => VerificationOutcome::Transient(format!(
                "no response within {}ms",
                self.request_timeout.as_millis()
            )),
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted responses, then answers `Failure`
    struct ScriptedService {
        script: Mutex<VecDeque<Result<CheckVerdict>>>,
        calls: AtomicUsize,
    }

    impl ScriptedService {
        fn new(script: Vec<Result<CheckVerdict>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CheckService for ScriptedService {
        async fn fetch_target(&self) -> Result<String> {
            Ok("target".to_string())
        }

        async fn check(&self, _candidate: &str) -> Result<CheckVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .pop_front()
                .unwrap_or(Ok(CheckVerdict::Failure))
        }
    }

    fn verifier(service: Arc<dyn CheckService>, budget: usize) -> (Verifier, Arc<RunStats>) {
        let stats = Arc::new(RunStats::new());
        let verifier = Verifier::new(
            service,
            ConcurrencyLimiter::new(4).unwrap(),
            budget,
            Duration::from_secs(5),
            Arc::clone(&stats),
        );
        (verifier, stats)
    }

    fn reset() -> Result<CheckVerdict> {
        Err(KeyforgeError::transient("connection reset", None, None))
    }

    #[tokio::test]
    async fn test_accepted_and_rejected() {
        let service =
            ScriptedService::new(vec![Ok(CheckVerdict::Success), Ok(CheckVerdict::Failure)]);
        let (verifier, _) = verifier(service.clone(), 3);
        let cancel = CancellationToken::new();

        assert_eq!(verifier.verify("a", &cancel).await.unwrap(), VerificationOutcome::Accepted);
        assert_eq!(verifier.verify("b", &cancel).await.unwrap(), VerificationOutcome::Rejected);
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn test_transient_then_success_is_retried() {
        let service = ScriptedService::new(vec![reset(), reset(), Ok(CheckVerdict::Success)]);
        let (verifier, stats) = verifier(service.clone(), 3);

        let outcome = verifier.verify("42", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, VerificationOutcome::Accepted);
        assert_eq!(service.calls(), 3);
        assert_eq!(stats.snapshot().transient_failures, 2);
        assert_eq!(stats.checks_issued(), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_unknown() {
        let service =
            ScriptedService::new(vec![reset(), reset(), reset(), Ok(CheckVerdict::Success)]);
        let (verifier, _) = verifier(service.clone(), 3);

        let outcome = verifier.verify("x", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, VerificationOutcome::Unknown);
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test]
    async fn test_protocol_error_not_retried() {
        let service = ScriptedService::new(vec![Err(KeyforgeError::protocol("garbage", None))]);
        let (verifier, _) = verifier(service.clone(), 3);

        let outcome = verifier.verify("x", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, VerificationOutcome::Unknown);
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_issues_no_request() {
        let service = ScriptedService::new(vec![]);
        let (verifier, stats) = verifier(service.clone(), 3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = verifier.verify("x", &cancel).await.unwrap_err();
        assert!(matches!(err, KeyforgeError::Cancelled { .. }));
        assert_eq!(service.calls(), 0);
        assert_eq!(stats.checks_issued(), 0);
    }

    struct SlowService;

    #[async_trait]
    impl CheckService for SlowService {
        async fn fetch_target(&self) -> Result<String> {
            Ok(String::new())
        }

        async fn check(&self, _candidate: &str) -> Result<CheckVerdict> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(CheckVerdict::Success)
        }
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let stats = Arc::new(RunStats::new());
        let verifier = Verifier::new(
            Arc::new(SlowService),
            ConcurrencyLimiter::new(1).unwrap(),
            2,
            Duration::from_millis(20),
            Arc::clone(&stats),
        );

        let outcome = verifier.verify("x", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, VerificationOutcome::Unknown);
        assert_eq!(stats.snapshot().transient_failures, 2);
    }

    /// Tracks the peak number of concurrent `check` calls
    struct GaugeService {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl CheckService for GaugeService {
        async fn fetch_target(&self) -> Result<String> {
            Ok(String::new())
        }

        async fn check(&self, _candidate: &str) -> Result<CheckVerdict> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Err(KeyforgeError::transient("flaky", None, None))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_never_exceeds_limiter() {
        let service = Arc::new(GaugeService {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let verifier = Arc::new(Verifier::new(
            service.clone(),
            ConcurrencyLimiter::new(8).unwrap(),
            3,
            Duration::from_secs(5),
            Arc::new(RunStats::new()),
        ));
        let cancel = CancellationToken::new();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..100 {
            let verifier = Arc::clone(&verifier);
            let cancel = cancel.clone();
            tasks.spawn(async move { verifier.verify(&i.to_string(), &cancel).await });
        }
        while let Some(res) = tasks.join_next().await {
            assert_eq!(res.unwrap().unwrap(), VerificationOutcome::Unknown);
        }

        let peak = service.peak.load(Ordering::SeqCst);
        assert!(peak <= 8, "peak in-flight {} exceeds limiter", peak);
        assert!(peak >= 1);
    }
}
