//! Error taxonomy for the release pipeline.
//!
//! [`HostError`] is what a port implementation (GitHub, storefront, chat, object storage)
//! returns. It keeps the one distinction the pipeline acts on: a read timeout may be retried
//! by the documentation merge step, everything else is final.
//!
//! [`RelayError`] is the pipeline-level error. Every variant aborts the run; the two cases the
//! pipeline deliberately swallows (already-merged-on-retry, failed notifications) never become
//! a `RelayError` in the first place.

use thiserror::Error;

use crate::readiness::NotReadyReason;

/// Failure reported by an external collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The request was sent but the response did not arrive in time.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The remote answered with a non-success status (validation error, not found, ...).
    #[error("remote rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Connection-level failure other than a timeout.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The response arrived but could not be decoded.
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl HostError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HostError::Timeout(_))
    }
}

impl From<reqwest::Error> for HostError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HostError::Timeout(e.to_string())
        } else if e.is_decode() {
            HostError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            HostError::Rejected {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            HostError::Transport(e.to_string())
        }
    }
}

/// Unified error type for the release pipeline.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Documentation not ready: {0}")]
    Precondition(NotReadyReason),

    #[error("Wrong version in pull request title {title:?}: expected {expected:?}")]
    TitleMismatch { title: String, expected: String },

    #[error("Version parsing error: {0}")]
    Version(String),

    #[error("No package matching {pattern} found in store listing")]
    ListingMissing { pattern: String },

    #[error("Changelog error: {0}")]
    Changelog(String),

    #[error("Upstream error: {0}")]
    Host(#[from] HostError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Convenience type alias for Results in the release pipeline
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    pub fn config(msg: impl Into<String>) -> Self {
        RelayError::Config(msg.into())
    }

    pub fn version(msg: impl Into<String>) -> Self {
        RelayError::Version(msg.into())
    }

    pub fn changelog(msg: impl Into<String>) -> Self {
        RelayError::Changelog(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::config("PAT_TOKEN is not set");
        assert_eq!(err.to_string(), "Configuration error: PAT_TOKEN is not set");
    }

    #[test]
    fn test_host_error_wraps_into_relay_error() {
        let err: RelayError = HostError::Rejected {
            status: 422,
            body: "Validation Failed".into(),
        }
        .into();
        assert!(err.to_string().contains("422"));
        assert!(err.to_string().contains("Validation Failed"));
    }

    #[test]
    fn test_precondition_names_reason() {
        let err = RelayError::Precondition(NotReadyReason::AmbiguousPullRequests(2));
        assert!(err.to_string().contains("2 open pull requests"));
    }

    #[test]
    fn test_only_timeout_is_timeout() {
        assert!(HostError::Timeout("read".into()).is_timeout());
        assert!(!HostError::Transport("reset".into()).is_timeout());
    }
}
