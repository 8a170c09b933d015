//! Run statistics shared between workers, dispatcher and verifiers

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free counters for one run
#[derive(Debug)]
pub struct RunStats {
    candidates_generated: AtomicU64,
    batches_received: AtomicU64,
    checks_issued: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    unknown: AtomicU64,
    transient_failures: AtomicU64,
    skipped: AtomicU64,
    started: Instant,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            candidates_generated: AtomicU64::new(0),
            batches_received: AtomicU64::new(0),
            checks_issued: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            unknown: AtomicU64::new(0),
            transient_failures: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn add_candidates_generated(&self, count: u64) {
        self.candidates_generated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_batches_received(&self) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
    }

    /// One request put on the wire
    pub fn increment_checks_issued(&self) {
        self.checks_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_unknown(&self) {
        self.unknown.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transient_failures(&self) {
        self.transient_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Candidates dropped because the run was already over
    pub fn add_skipped(&self, count: u64) {
        self.skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn checks_issued(&self) -> u64 {
        self.checks_issued.load(Ordering::Relaxed)
    }

    /// Candidates with a final outcome
    pub fn candidates_resolved(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
            + self.rejected.load(Ordering::Relaxed)
            + self.unknown.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.elapsed();
        let resolved = self.candidates_resolved();
        let checks_per_second = if elapsed.as_secs_f64() > 0.0 {
            resolved as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        StatsSnapshot {
            candidates_generated: self.candidates_generated.load(Ordering::Relaxed),
            batches_received: self.batches_received.load(Ordering::Relaxed),
            checks_issued: self.checks_issued.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            elapsed_ms: elapsed.as_millis() as u64,
            checks_per_second,
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`RunStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub candidates_generated: u64,
    pub batches_received: u64,
    pub checks_issued: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub unknown: u64,
    pub transient_failures: u64,
    pub skipped: u64,
    pub elapsed_ms: u64,
    pub checks_per_second: f64,
}

impl StatsSnapshot {
    pub fn resolved(&self) -> u64 {
        self.accepted + self.rejected + self.unknown
    }
}
