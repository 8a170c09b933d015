//! Error handling for keyforge

use thiserror::Error;

/// Main error type for keyforge
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyforgeError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Resource exhaustion: {resource} {message}")]
    ResourceExhaustion { resource: String, message: String },

    #[error("Transient error: {message}")]
    Transient {
        message: String,
        status_code: Option<u16>,
        url: Option<String>,
    },

    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        content: Option<String>,
    },

    #[error("Channel closed: worker {worker}")]
    ChannelClosed { worker: usize },

    #[error("Cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl KeyforgeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a resource exhaustion error
    pub fn resource_exhaustion(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceExhaustion {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a transient (retryable) error
    pub fn transient(
        message: impl Into<String>,
        status_code: Option<u16>,
        url: Option<String>,
    ) -> Self {
        Self::Transient {
            message: message.into(),
            status_code,
            url,
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>, content: Option<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            content,
        }
    }

    /// Create a channel closed error
    pub fn channel_closed(worker: usize) -> Self {
        Self::ChannelClosed { worker }
    }

    /// Create a cancellation error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether this error is fatal at startup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::ResourceExhaustion { .. } | Self::Internal { .. }
        )
    }

    /// Get user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message } => {
                format!(
                    "❌ Configuration problem: {}\n💡 Check your .env file or KEYFORGE_* variables",
                    message
                )
            }
            Self::ResourceExhaustion { resource, message } => {
                format!(
                    "❌ {} {}\n💡 Capacities and limits must be positive and within bounds",
                    resource, message
                )
            }
            Self::Transient { message, status_code, .. } => {
                let status = status_code.map_or(String::new(), |c| format!(" ({})", c));
                format!(
                    "⏱️  Transient error{}: {}\n💡 Check that the verification service is reachable",
                    status, message
                )
            }
            Self::Protocol { message, .. } => {
                format!(
                    "❌ Unexpected response: {}\n💡 The service speaks a different schema",
                    message
                )
            }
            Self::ChannelClosed { worker } => {
                format!("⚠️  Worker {} channel closed", worker)
            }
            Self::Cancelled { reason } => {
                format!("⚠️  Cancelled: {}", reason)
            }
            Self::Internal { message } => {
                format!("❌ Internal error: {}\n💡 This is a bug, please report it", message)
            }
        }
    }
}

/// Every reqwest failure is a transport problem from the verifier's point of view
impl From<reqwest::Error> for KeyforgeError {
    fn from(err: reqwest::Error) -> Self {
        let status_code = err.status().map(|s| s.as_u16());
        let url = err.url().map(|u| u.to_string());

        if err.is_timeout() {
            Self::transient("HTTP request timed out", status_code, url)
        } else if err.is_connect() {
            Self::transient("Connection failed", status_code, url)
        } else if err.is_request() {
            Self::transient("Request failed", status_code, url)
        } else {
            Self::transient(err.to_string(), status_code, url)
        }
    }
}

impl From<tokio::sync::AcquireError> for KeyforgeError {
    fn from(_: tokio::sync::AcquireError) -> Self {
        Self::internal("Concurrency limiter closed")
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, KeyforgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(KeyforgeError::transient("reset", None, None).is_transient());
        assert!(!KeyforgeError::protocol("bad json", None).is_transient());
        assert!(!KeyforgeError::cancelled("found").is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(KeyforgeError::config("empty charset").is_fatal());
        assert!(KeyforgeError::resource_exhaustion("channel", "capacity is zero").is_fatal());
        assert!(!KeyforgeError::channel_closed(3).is_fatal());
    }
}
