//! Odometer-order candidate generator

use std::iter::FusedIterator;

use crate::types::SearchSpace;

/// Generator for every fixed-length string over a charset
///
/// Candidates come out as digits of a mixed-radix counter: position 0 is the
/// most significant, the last position increments fastest.
pub struct OdometerGenerator {
    symbols: Vec<char>,
    digits: Vec<usize>,
    remaining: Option<u128>,
    exhausted: bool,
}

impl OdometerGenerator {
    /// Create a new generator starting at `charset[0]` repeated `length` times
    pub fn new(space: &SearchSpace) -> Self {
        let symbols = space.charset.symbols().to_vec();
        Self {
            exhausted: symbols.is_empty() && space.length > 0,
            digits: vec![0; space.length],
            remaining: space.combination_count(),
            symbols,
        }
    }

    /// Get total number of combinations, if it fits
    pub fn remaining(&self) -> Option<u128> {
        if self.exhausted {
            Some(0)
        } else {
            self.remaining
        }
    }

    /// Check if generator is exhausted
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn render(&self) -> String {
        self.digits.iter().map(|&d| self.symbols[d]).collect()
    }

    /// Advance the counter; returns false once the most significant digit carries out
    fn advance(&mut self) -> bool {
        let max = self.symbols.len().saturating_sub(1);
        for digit in self.digits.iter_mut().rev() {
            if *digit < max {
                *digit += 1;
                return true;
            }
            *digit = 0;
        }
        false
    }
}

impl Iterator for OdometerGenerator {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let candidate = self.render();
        if !self.advance() {
            self.exhausted = true;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }

        Some(candidate)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.remaining().map(usize::try_from) {
            Some(Ok(n)) => (n, Some(n)),
            _ => (usize::MAX, None),
        }
    }
}

impl FusedIterator for OdometerGenerator {}
