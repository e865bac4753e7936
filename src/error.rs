// src/error.rs
//! Application error types with structured error handling.
//!
//! Only two failures end an extraction session: a payload that cannot be
//! decoded and a session that runs past its deadline. Everything that goes
//! wrong with a single image is a [`FetchError`] and stays local to the
//! scene that referenced it.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::coordinator::SessionId;

/// Why a single image could not be fetched.
///
/// Every kind is treated as transient by the retry loop; a fetch is only
/// abandoned once the attempt budget is spent, which yields `Exhausted`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("server answered with HTTP {0}")]
    HttpStatus(u16),

    #[error("response body was empty")]
    EmptyBody,

    #[error("request timed out")]
    Timeout,

    #[error("gave up on {url} after {attempts} attempts (last error: {last})")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Exhausted { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::HttpStatus(status.as_u16())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed scrape payload: {0}")]
    Decode(String),

    #[error("No decoded story within {timeout:?}")]
    ExtractionTimeout { timeout: Duration },

    #[error("Session {session} was superseded by a newer extraction")]
    SessionSuperseded { session: SessionId },

    #[error("Image fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cache IO error at {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Filesystem IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network failure: {0}")]
    NetworkFailure(#[from] reqwest::Error),

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Internal error: {message}")]
    InternalError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl AppError {
    /// Wraps an IO error with the cache path it happened on.
    pub fn cache_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::CacheIo {
            path: path.into(),
            source,
        }
    }

    /// Whether this error ends the extraction session it occurred in.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Decode(_)
                | AppError::ExtractionTimeout { .. }
                | AppError::SessionSuperseded { .. }
                | AppError::InternalError { .. }
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalError {
            message: format!("background task failed: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

/// Result type alias for convenience
pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_decode_and_timeout_escalate() {
        assert!(AppError::Decode("bad".into()).is_session_fatal());
        assert!(AppError::ExtractionTimeout {
            timeout: Duration::from_secs(1)
        }
        .is_session_fatal());
        assert!(!AppError::Fetch(FetchError::EmptyBody).is_session_fatal());
        assert!(!AppError::cache_io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full")
        )
        .is_session_fatal());
    }

    #[test]
    fn exhausted_is_terminal() {
        let err = FetchError::Exhausted {
            url: "https://img.example/a.png".into(),
            attempts: 3,
            last: Box::new(FetchError::HttpStatus(503)),
        };
        assert!(!err.is_retryable());
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::EmptyBody.is_retryable());
        let message = err.to_string();
        assert!(message.starts_with("gave up on https://img.example/a.png after 3 attempts"));
        assert!(message.ends_with("(last error: server answered with HTTP 503)"));
    }
}
