//! Fixed-size batching over a candidate stream

use std::iter::FusedIterator;

/// Groups an iterator's items into batches of at most `batch_size`
///
/// Full batches are yielded as soon as they fill; the last one may be short.
/// An empty batch is never yielded.
pub struct Batcher<I> {
    inner: I,
    batch_size: usize,
}

impl<I: Iterator> Batcher<I> {
    pub fn new(inner: I, batch_size: usize) -> Self {
        Self {
            inner,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<I: Iterator> Iterator for Batcher<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size);
        batch.extend(self.inner.by_ref().take(self.batch_size));
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

impl<I: FusedIterator> FusedIterator for Batcher<I> {}
