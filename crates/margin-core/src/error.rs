//! Error types for margin.

use thiserror::Error;

/// Result type alias using margin's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for margin operations.
///
/// Item-level problems (validation findings, individual note delivery
/// failures) are never represented here; they travel as data inside
/// [`crate::ValidationSummary`] and [`crate::DeliveryOutcome`]. This enum is
/// reserved for failures that abort a whole stage.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP/network request failed before a response was received
    #[error("Request error: {0}")]
    Request(String),

    /// Provider answered with a non-success status
    #[error("{provider} returned {status}: {message}")]
    Provider {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Stage exceeded its wall-clock execution budget
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Sink reported quota exhaustion and nothing was delivered
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Pipeline was asked to move between stages that are not connected
    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Key-value storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_request() {
        let err = Error::Request("network unreachable".to_string());
        assert_eq!(err.to_string(), "Request error: network unreachable");
    }

    #[test]
    fn test_error_display_provider() {
        let err = Error::Provider {
            provider: "Readwise",
            status: 401,
            message: "Invalid token".to_string(),
        };
        assert_eq!(err.to_string(), "Readwise returned 401: Invalid token");
    }

    #[test]
    fn test_error_display_deadline() {
        let err = Error::DeadlineExceeded("fetch budget of 60s".to_string());
        assert_eq!(err.to_string(), "Deadline exceeded: fetch budget of 60s");
    }

    #[test]
    fn test_error_display_invalid_transition() {
        let err = Error::InvalidTransition {
            from: "idle".to_string(),
            to: "syncing".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid stage transition: idle -> syncing");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("No valid highlights to sync".to_string());
        assert_eq!(err.to_string(), "Invalid input: No valid highlights to sync");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => {
                assert!(!msg.is_empty());
            }
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
