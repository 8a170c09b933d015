//! Run configuration, loaded from `KEYFORGE_*` environment variables

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::{KeyforgeError, Result};
use crate::pipeline::channel::capacity_in_batches;
use crate::types::{Charset, LengthRange};

/// Longest accepted request, shutdown or progress interval
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Largest batch a worker may allocate at once
pub const MAX_BATCH_SIZE: usize = 1 << 24;

/// How candidates are verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    /// Every candidate goes to `/check_password`
    #[default]
    Remote,
    /// Candidates are hashed locally against the `/get_password` digest;
    /// only a match is sent for confirmation
    Md5,
}

impl CheckMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "md5" => Ok(Self::Md5),
            other => Err(KeyforgeError::config(format!(
                "KEYFORGE_MODE must be 'remote' or 'md5', got '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for CheckMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckMode::Remote => write!(f, "remote"),
            CheckMode::Md5 => write!(f, "md5"),
        }
    }
}

/// Everything the pipeline reads at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Preset name (`digits`, `lower`, `upper`, `alnum`) or literal symbols
    pub charset: String,
    /// Shortest candidate length (inclusive)
    pub min_length: usize,
    /// Longest candidate length (exclusive)
    pub max_length: usize,
    /// Generator worker threads
    pub workers: usize,
    /// Candidates per batch
    pub batch_size: usize,
    /// Transport channel capacity, in candidates
    pub channel_capacity: usize,
    /// Concurrent verification requests
    pub max_concurrency: usize,
    /// Verification tasks the dispatcher may have outstanding
    pub max_pending: usize,
    /// Attempts per candidate before giving up as unknown
    pub retry_budget: usize,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// Zero disables progress reports
    pub progress_interval: Duration,
    /// Verification service root URL
    pub base_url: String,
    pub mode: CheckMode,
    /// Log file truncated at startup; `None` logs to the console only
    pub log_file: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let concurrency = 1024;
        Self {
            charset: "alnum".to_string(),
            min_length: 8,
            max_length: 16,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            batch_size: 500_000,
            channel_capacity: 4_000_000,
            max_concurrency: concurrency,
            max_pending: concurrency * 2,
            retry_budget: 3,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            progress_interval: Duration::from_secs(10),
            base_url: "http://127.0.0.1:5000".to_string(),
            mode: CheckMode::Remote,
            log_file: Some(PathBuf::from("requests.log")),
        }
    }
}

impl SearchConfig {
    /// Load `.env` if present, then read `KEYFORGE_*` variables over the defaults
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(charset) = lookup("KEYFORGE_CHARSET") {
            config.charset = charset;
        }
        if let Some(url) = lookup("KEYFORGE_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(mode) = lookup("KEYFORGE_MODE") {
            config.mode = CheckMode::parse(&mode)?;
        }
        if let Some(path) = lookup("KEYFORGE_LOG_FILE") {
            let path = path.trim();
            config.log_file = (!path.is_empty()).then(|| PathBuf::from(path));
        }

        read_usize(&lookup, "KEYFORGE_MIN_LENGTH", &mut config.min_length)?;
        read_usize(&lookup, "KEYFORGE_MAX_LENGTH", &mut config.max_length)?;
        read_usize(&lookup, "KEYFORGE_WORKERS", &mut config.workers)?;
        read_usize(&lookup, "KEYFORGE_BATCH_SIZE", &mut config.batch_size)?;
        read_usize(&lookup, "KEYFORGE_CHANNEL_CAPACITY", &mut config.channel_capacity)?;
        read_usize(&lookup, "KEYFORGE_RETRY_BUDGET", &mut config.retry_budget)?;

        if read_usize(&lookup, "KEYFORGE_MAX_CONCURRENCY", &mut config.max_concurrency)? {
            config.max_pending = config.max_concurrency.saturating_mul(2);
        }
        read_usize(&lookup, "KEYFORGE_MAX_PENDING", &mut config.max_pending)?;

        read_secs(&lookup, "KEYFORGE_REQUEST_TIMEOUT_SECS", &mut config.request_timeout)?;
        read_secs(&lookup, "KEYFORGE_SHUTDOWN_TIMEOUT_SECS", &mut config.shutdown_timeout)?;
        read_secs(&lookup, "KEYFORGE_PROGRESS_INTERVAL_SECS", &mut config.progress_interval)?;

        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        Charset::parse(&self.charset)?;

        if self.min_length >= self.max_length {
            return Err(KeyforgeError::config(format!(
                "Length range {} is empty",
                self.length_range()
            )));
        }
        if self.workers == 0 {
            return Err(KeyforgeError::config("Worker count must be positive"));
        }
        if self.batch_size == 0 {
            return Err(KeyforgeError::config("Batch size must be positive"));
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(KeyforgeError::config(format!(
                "Batch size must be at most {}",
                MAX_BATCH_SIZE
            )));
        }
        if self.retry_budget == 0 {
            return Err(KeyforgeError::config("Retry budget must allow at least one attempt"));
        }
        for (name, value) in [
            ("Request timeout", self.request_timeout),
            ("Shutdown timeout", self.shutdown_timeout),
            ("Progress interval", self.progress_interval),
        ] {
            if value > MAX_INTERVAL {
                return Err(KeyforgeError::config(format!(
                    "{} must be at most {} seconds",
                    name,
                    MAX_INTERVAL.as_secs()
                )));
            }
        }
        if self.channel_capacity == 0 {
            return Err(KeyforgeError::resource_exhaustion(
                "Transport channel",
                "capacity is zero",
            ));
        }
        if capacity_in_batches(self.channel_capacity, self.batch_size) > Semaphore::MAX_PERMITS {
            return Err(KeyforgeError::resource_exhaustion(
                "Transport channel",
                format!("capacity exceeds {} batches", Semaphore::MAX_PERMITS),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(KeyforgeError::resource_exhaustion(
                "Concurrency limiter",
                "size is zero",
            ));
        }
        if self.max_concurrency > Semaphore::MAX_PERMITS {
            return Err(KeyforgeError::resource_exhaustion(
                "Concurrency limiter",
                format!("size exceeds {}", Semaphore::MAX_PERMITS),
            ));
        }
        if self.max_pending == 0 {
            return Err(KeyforgeError::resource_exhaustion(
                "Dispatcher",
                "pending task bound is zero",
            ));
        }

        Ok(())
    }

    pub fn length_range(&self) -> LengthRange {
        LengthRange::new(self.min_length, self.max_length)
    }
}

fn read_usize<F>(lookup: &F, key: &str, target: &mut usize) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => {
            *target = raw.trim().parse().map_err(|_| {
                KeyforgeError::config(format!(
                    "{} must be a non-negative integer, got '{}'",
                    key, raw
                ))
            })?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn read_secs<F>(lookup: &F, key: &str, target: &mut Duration) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let mut secs = 0usize;
    if read_usize(lookup, key, &mut secs)? {
        *target = Duration::from_secs(secs as u64);
    }
    Ok(())
}
