//! Keyforge - exhaustive candidate generation with concurrent remote verification
//!
//! Enumerates every fixed-length string over a charset, ships the candidates in
//! bounded batches to a dispatcher, and verifies them against a remote service
//! until one is accepted or the space runs out. In MD5 mode candidates are
//! matched against the service's digest locally and only a match is sent
//! for confirmation.

pub mod config;
pub mod error;
pub mod generator;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod types;
pub mod verify;

// Re-export commonly used types
pub use config::{CheckMode, SearchConfig};
pub use error::{KeyforgeError, Result};
pub use metrics::{RunStats, StatsSnapshot};
pub use types::{
    Batch, Charset, CheckVerdict, LengthRange, RunOutcome, SearchReport, SearchSpace,
    VerificationOutcome, WorkerSummary,
};

// Re-export main functionality
pub use generator::{Batcher, OdometerGenerator};
pub use pipeline::{Search, TerminationController};
pub use verify::{CheckService, HttpCheckService, Md5CheckService, Verifier};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

