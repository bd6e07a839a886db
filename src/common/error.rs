//! Error types for minifs

use crate::common::protocol::VoteSet;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Storage Errors ===
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    // === Write protocol Errors ===
    #[error("Writes for {filename} must go to primary {}, not {this_server}", .expected_primary.as_deref().unwrap_or("<none>"))]
    NotPrimary {
        filename: String,
        expected_primary: Option<String>,
        this_server: String,
    },

    #[error("Quorum failed: need {required} yes votes, got {received}")]
    QuorumFailed {
        votes: VoteSet,
        required: usize,
        received: usize,
    },

    #[error("Local write failed: {0}")]
    LocalWriteFailed(String),

    // === Network Errors ===
    #[error("Datacenter {node} unavailable: {reason}")]
    NetworkUnavailable { node: String, reason: String },

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // === Config Errors ===
    #[error("Unknown datacenter: {0}")]
    UnknownDatacenter(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Does this error abort a write as a whole?
    ///
    /// Peer failures never do; they are folded into votes and replication
    /// reports by the coordinator.
    pub fn is_write_abort(&self) -> bool {
        matches!(
            self,
            Error::NotPrimary { .. } | Error::QuorumFailed { .. } | Error::LocalWriteFailed(_)
        )
    }

    /// Did this error come from the peer being unreachable?
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Error::NetworkUnavailable { .. } | Error::Timeout(_) | Error::UnknownDatacenter(_)
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::NotPrimary { .. } => StatusCode::FORBIDDEN,
            Error::QuorumFailed { .. } => StatusCode::CONFLICT,
            Error::BadRequest(_) | Error::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            Error::NetworkUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Corrupted(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_abort_status_codes() {
        let not_primary = Error::NotPrimary {
            filename: "file1.txt".into(),
            expected_primary: Some("NY".into()),
            this_server: "TO".into(),
        };
        assert_eq!(not_primary.to_http_status(), StatusCode::FORBIDDEN);
        assert!(not_primary.is_write_abort());

        let quorum = Error::QuorumFailed {
            votes: VoteSet::new(),
            required: 2,
            received: 1,
        };
        assert_eq!(quorum.to_http_status(), StatusCode::CONFLICT);

        let local = Error::LocalWriteFailed("disk full".into());
        assert_eq!(local.to_http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_primary_message_without_primary() {
        let err = Error::NotPrimary {
            filename: "nope.txt".into(),
            expected_primary: None,
            this_server: "LD".into(),
        };
        assert!(err.to_string().contains("<none>"));
        assert!(!err.is_unreachable());
    }
}
