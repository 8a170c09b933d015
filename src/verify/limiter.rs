//! Global cap on in-flight verification requests

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{KeyforgeError, Result};

/// Counting limiter shared by every verifier call
///
/// Holding a [`Permit`] authorizes exactly one request on the wire; dropping
/// it gives the slot back.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    size: usize,
}

/// RAII permit for one request attempt
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(KeyforgeError::resource_exhaustion(
                "Concurrency limiter",
                "size is zero",
            ));
        }
        if size > Semaphore::MAX_PERMITS {
            return Err(KeyforgeError::resource_exhaustion(
                "Concurrency limiter",
                format!("size exceeds {}", Semaphore::MAX_PERMITS),
            ));
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    /// Suspend until a slot is free
    pub async fn acquire(&self) -> Result<Permit> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
        Ok(Permit { _permit: permit })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(
            ConcurrencyLimiter::new(0),
            Err(KeyforgeError::ResourceExhaustion { .. })
        ));
    }

    #[test]
    fn test_oversized_rejected() {
        assert!(matches!(
            ConcurrencyLimiter::new(Semaphore::MAX_PERMITS + 1),
            Err(KeyforgeError::ResourceExhaustion { .. })
        ));
        assert!(ConcurrencyLimiter::new(Semaphore::MAX_PERMITS).is_ok());
    }

    #[tokio::test]
    async fn test_acquire_blocks_at_capacity() {
        let limiter = ConcurrencyLimiter::new(2).unwrap();
        let a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(blocked.is_err());

        drop(a);
        let third = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(third.is_ok());
    }
}
