//! Core types and structures for keyforge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KeyforgeError, Result};
use crate::metrics::StatsSnapshot;

/// Ordered set of unique symbols candidates are built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charset {
    symbols: Vec<char>,
}

impl Charset {
    pub const DIGITS: &'static str = "0123456789";
    pub const LOWER: &'static str = "abcdefghijklmnopqrstuvwxyz";
    pub const UPPER: &'static str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    /// Build a charset from an ordered symbol list
    pub fn new(symbols: &str) -> Result<Self> {
        let symbols: Vec<char> = symbols.chars().collect();
        if symbols.is_empty() {
            return Err(KeyforgeError::config("Charset must contain at least one symbol"));
        }

        for (i, c) in symbols.iter().enumerate() {
            if symbols[..i].contains(c) {
                return Err(KeyforgeError::config(format!(
                    "Charset contains duplicate symbol '{}'",
                    c
                )));
            }
        }

        Ok(Self { symbols })
    }

    /// Resolve a preset name (`digits`, `lower`, `upper`, `alnum`) or a literal symbol list
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "digits" => Self::new(Self::DIGITS),
            "lower" => Self::new(Self::LOWER),
            "upper" => Self::new(Self::UPPER),
            "alnum" => Self::new(&format!("{}{}{}", Self::DIGITS, Self::LOWER, Self::UPPER)),
            literal => Self::new(literal),
        }
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for c in &self.symbols {
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// All candidates of one length over one charset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpace {
    pub charset: Charset,
    pub length: usize,
}

impl SearchSpace {
    pub fn new(charset: Charset, length: usize) -> Self {
        Self { charset, length }
    }

    /// `|charset|^length`, or `None` if it does not fit in 128 bits
    pub fn combination_count(&self) -> Option<u128> {
        let exp = u32::try_from(self.length).ok()?;
        (self.charset.len() as u128).checked_pow(exp)
    }
}

/// Half-open range of candidate lengths `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRange {
    pub start: usize,
    pub end: usize,
}

impl LengthRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn lengths(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    /// Split into at most `parts` disjoint, contiguous, non-empty ranges covering `self`.
    ///
    /// Sizes differ by at most one; the larger ranges come first.
    pub fn partition(&self, parts: usize) -> Vec<LengthRange> {
        let span = self.len();
        let parts = parts.min(span);
        if parts == 0 {
            return Vec::new();
        }

        let base = span / parts;
        let extra = span % parts;
        let mut ranges = Vec::with_capacity(parts);
        let mut start = self.start;

        for i in 0..parts {
            let size = base + usize::from(i < extra);
            ranges.push(LengthRange::new(start, start + size));
            start += size;
        }

        ranges
    }
}

impl std::fmt::Display for LengthRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A chunk of same-length candidates in generation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub worker: usize,
    pub length: usize,
    pub candidates: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Verdict of one well-formed service response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckVerdict {
    Success,
    Failure,
}

/// Result of verifying one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationOutcome {
    Accepted,
    Rejected,
    /// Only seen between attempts, never as a final outcome
    Transient(String),
    Unknown,
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationOutcome::Accepted => write!(f, "accepted"),
            VerificationOutcome::Rejected => write!(f, "rejected"),
            VerificationOutcome::Transient(cause) => write!(f, "transient ({})", cause),
            VerificationOutcome::Unknown => write!(f, "unknown"),
        }
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Pending,
    Found(String),
    Exhausted,
    Cancelled(String),
}

impl RunOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Found(_) | RunOutcome::Exhausted => 0,
            RunOutcome::Pending | RunOutcome::Cancelled(_) => 1,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Pending => write!(f, "pending"),
            RunOutcome::Found(candidate) => write!(f, "candidate found: {}", candidate),
            RunOutcome::Exhausted => write!(f, "search space exhausted, not found"),
            RunOutcome::Cancelled(reason) => write!(f, "cancelled: {}", reason),
        }
    }
}

/// What a generator worker did before it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub worker: usize,
    pub lengths_completed: usize,
    pub batches_sent: u64,
    pub candidates_sent: u64,
    pub cancelled: bool,
}

/// What a finished run hands back to its caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    pub outcome: RunOutcome,
    pub stats: StatsSnapshot,
    /// Workers that joined within the shutdown timeout, by worker id
    pub workers: Vec<WorkerSummary>,
    /// Workers still running when the shutdown timeout expired
    pub abandoned_workers: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SearchReport {
    pub fn found(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Found(candidate) => Some(candidate),
            _ => None,
        }
    }

    /// Every worker joined and none was abandoned
    pub fn clean_shutdown(&self) -> bool {
        self.abandoned_workers == 0
    }
}
