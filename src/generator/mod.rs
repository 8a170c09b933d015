//! Candidate generation
//!
//! `OdometerGenerator` enumerates every string of one length over a charset;
//! `Batcher` chunks that stream for transport.

mod batcher;
mod odometer;

pub use batcher::Batcher;
pub use odometer::OdometerGenerator;

use crate::types::SearchSpace;

/// Batch size actually used for a space: never larger than the space itself
pub fn effective_batch_size(configured: usize, space: &SearchSpace) -> usize {
    let size = match space.combination_count() {
        Some(count) => usize::try_from(count)
            .map(|count| configured.min(count))
            .unwrap_or(configured),
        None => configured,
    };
    size.max(1)
}

/// Batched odometer stream for one search space
pub fn batches(space: &SearchSpace, configured_batch_size: usize) -> Batcher<OdometerGenerator> {
    Batcher::new(
        OdometerGenerator::new(space),
        effective_batch_size(configured_batch_size, space),
    )
}
