//! Remote candidate verification

pub mod client;
pub mod limiter;
pub mod md5;
pub mod verifier;

pub use client::HttpCheckService;
pub use limiter::ConcurrencyLimiter;
pub use md5::Md5CheckService;
pub use verifier::Verifier;

use crate::error::Result;
use crate::types::CheckVerdict;
use async_trait::async_trait;

/// The external checking service
///
/// `check` must return `Err` with a transient error for transport problems and
/// a protocol error for responses it cannot interpret.
#[async_trait]
pub trait CheckService: Send + Sync {
    /// One-time setup before the first check; an error here aborts the run
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Fetch the opaque target descriptor
    async fn fetch_target(&self) -> Result<String>;

    /// Submit one candidate and read the service's verdict
    async fn check(&self, candidate: &str) -> Result<CheckVerdict>;
}
