//! Run state and first-result-wins termination

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use crate::types::RunOutcome;

/// Point-in-time view of the run state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub outcome: RunOutcome,
    pub active_workers: usize,
    pub active_channels: Vec<usize>,
}

#[derive(Debug)]
struct RunState {
    outcome: RunOutcome,
    active_channels: BTreeSet<usize>,
}

/// Sole writer of the run outcome
///
/// The outcome leaves `Pending` at most once; the transition that wins also
/// performs the single cancellation broadcast.
#[derive(Debug)]
pub struct TerminationController {
    state: Mutex<RunState>,
    active_workers: AtomicUsize,
    broadcasts: AtomicUsize,
    token: CancellationToken,
}

impl TerminationController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState {
                outcome: RunOutcome::Pending,
                active_channels: BTreeSet::new(),
            }),
            active_workers: AtomicUsize::new(0),
            broadcasts: AtomicUsize::new(0),
            token: CancellationToken::new(),
        }
    }

    /// Token every worker, dispatcher and verifier watches
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Record an accepted candidate. Returns `true` if this report won.
    pub fn report_found(&self, candidate: &str) -> bool {
        let won = self.transition(RunOutcome::Found(candidate.to_string()));
        if won {
            tracing::info!(candidate = %candidate, "Candidate accepted, stopping search");
            self.broadcast();
        } else {
            tracing::info!(
                candidate = %candidate,
                "Ignoring accepted candidate, run already finished"
            );
        }
        won
    }

    /// Record that every channel drained without a success
    pub fn report_exhausted(&self) -> bool {
        let won = self.transition(RunOutcome::Exhausted);
        if won {
            tracing::info!("Search space exhausted");
            self.broadcast();
        }
        won
    }

    /// Cancel the run without a result
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let won = self.transition(RunOutcome::Cancelled(reason.clone()));
        if won {
            tracing::warn!(reason = %reason, "Search cancelled");
            self.broadcast();
        }
        won
    }

    pub fn outcome(&self) -> RunOutcome {
        self.state.lock().outcome.clone()
    }

    /// Number of cancellation broadcasts performed; never more than one
    pub fn broadcasts(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    pub fn worker_finished(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn channel_opened(&self, worker: usize) {
        self.state.lock().active_channels.insert(worker);
    }

    pub fn channel_drained(&self, worker: usize) {
        self.state.lock().active_channels.remove(&worker);
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let state = self.state.lock();
        RunSnapshot {
            outcome: state.outcome.clone(),
            active_workers: self.active_workers(),
            active_channels: state.active_channels.iter().copied().collect(),
        }
    }

    /// Compare-and-set `Pending -> next`
    fn transition(&self, next: RunOutcome) -> bool {
        let mut state = self.state.lock();
        if state.outcome.is_pending() {
            state.outcome = next;
            true
        } else {
            false
        }
    }

    fn broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        self.token.cancel();
    }
}

impl Default for TerminationController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_found_wins() {
        let controller = TerminationController::new();
        assert!(controller.report_found("42"));
        assert!(!controller.report_found("43"));
        assert!(!controller.report_exhausted());
        assert!(!controller.cancel("interrupt"));

        assert_eq!(controller.outcome(), RunOutcome::Found("42".to_string()));
        assert_eq!(controller.broadcasts(), 1);
        assert!(controller.is_cancelled());
    }

    #[test]
    fn test_exhausted_then_found_ignored() {
        let controller = TerminationController::new();
        assert!(controller.report_exhausted());
        assert!(!controller.report_found("late"));
        assert_eq!(controller.outcome(), RunOutcome::Exhausted);
    }

    #[test]
    fn test_cancel_records_reason() {
        let controller = TerminationController::new();
        assert!(controller.cancel("operator interrupt"));
        assert_eq!(
            controller.outcome(),
            RunOutcome::Cancelled("operator interrupt".to_string())
        );
    }

    #[test]
    fn test_concurrent_reports_single_broadcast() {
        let controller = Arc::new(TerminationController::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let controller = Arc::clone(&controller);
                std::thread::spawn(move || controller.report_found(&format!("c{}", i)))
            })
            .collect();

        let winners: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(winners.iter().filter(|w| **w).count(), 1);
        assert_eq!(controller.broadcasts(), 1);

        let winner = winners.iter().position(|w| *w).unwrap();
        assert_eq!(controller.outcome(), RunOutcome::Found(format!("c{}", winner)));
    }

    #[test]
    fn test_tracks_workers_and_channels() {
        let controller = TerminationController::new();
        controller.worker_started();
        controller.worker_started();
        controller.channel_opened(0);
        controller.channel_opened(1);
        controller.worker_finished();
        controller.channel_drained(0);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.outcome, RunOutcome::Pending);
        assert_eq!(snapshot.active_workers, 1);
        assert_eq!(snapshot.active_channels, vec![1]);
    }
}
