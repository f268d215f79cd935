use std::{error::Error as StdError, time::Duration};

use thiserror::Error;

use crate::{GenerationAttempt, ParsedResult};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("AI service failed after {} attempt(s): {last_error}", .attempts.len())]
    Service {
        last_error: ProviderError,
        attempts: Vec<GenerationAttempt>,
    },
    #[error("Validation failed: {reason}")]
    Validation {
        reason: String,
        raw_response: Option<String>,
        partial: Option<Box<ParsedResult>>,
    },
    #[error("Deadline exceeded after {elapsed:?} ({} attempt(s))", .attempts.len())]
    Timeout {
        elapsed: Duration,
        attempts: Vec<GenerationAttempt>,
    },
    #[error("Generation was cancelled")]
    Cancelled { attempts: Vec<GenerationAttempt> },
    #[error("Persisting generation record failed: {0}")]
    Persistence(#[from] StoreError),
}

impl GenerationError {
    pub fn validation(reason: impl Into<String>) -> Self {
        GenerationError::Validation {
            reason: reason.into(),
            raw_response: None,
            partial: None,
        }
    }

    /// Attempt log carried by the error, empty for errors raised outside the
    /// retry loop.
    pub fn attempts(&self) -> &[GenerationAttempt] {
        match self {
            GenerationError::Service { attempts, .. }
            | GenerationError::Timeout { attempts, .. }
            | GenerationError::Cancelled { attempts } => attempts,
            _ => &[],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Configuration(_) => "configuration",
            GenerationError::Service { .. } => "service",
            GenerationError::Validation { .. } => "validation",
            GenerationError::Timeout { .. } => "timeout",
            GenerationError::Cancelled { .. } => "cancelled",
            GenerationError::Persistence(_) => "persistence",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProviderErrorKind {
    #[error("network error")]
    Network,
    #[error("timeout error")]
    Timeout,
    #[error("rate limited (retry_after={})", render_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}")]
    Server { status: u16 },
    #[error("malformed response")]
    Malformed,
    #[error("auth error")]
    Auth,
    #[error("invalid request")]
    InvalidRequest,
    #[error("blocked by provider safety filters")]
    Blocked,
}

fn render_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(duration) => format!("{duration:?}"),
        None => "unknown".to_string(),
    }
}

impl ProviderErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderErrorKind::Network
                | ProviderErrorKind::Timeout
                | ProviderErrorKind::RateLimited { .. }
                | ProviderErrorKind::Server { .. }
                | ProviderErrorKind::Malformed
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderErrorKind::Network => "network",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::RateLimited { .. } => "rate_limited",
            ProviderErrorKind::Server { .. } => "server",
            ProviderErrorKind::Malformed => "malformed",
            ProviderErrorKind::Auth => "auth",
            ProviderErrorKind::InvalidRequest => "invalid_request",
            ProviderErrorKind::Blocked => "blocked",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ProviderErrorKind::Timeout,
            format!("attempt timed out after {after:?}"),
        )
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::new(
            ProviderErrorKind::RateLimited { retry_after },
            "too many requests",
        )
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Server { status }, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidRequest, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self.kind {
            ProviderErrorKind::RateLimited { retry_after } => retry_after,
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid record key: {0}")]
    InvalidKey(String),
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store error: {0}")]
    Internal(#[source] Box<dyn StdError + Send + Sync>),
}
