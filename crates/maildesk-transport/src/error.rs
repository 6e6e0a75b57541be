//! Error types for the transport layer.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a remote mail server.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Server unreachable or the connection dropped.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Credentials rejected by the server.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Operation exceeded its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The server replied with something the adapter could not handle.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server refused to accept an outgoing message.
    #[error("Message rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether retrying at the next sync cadence is likely to help.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

/// Result type alias using our `TransportError` type.
pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_and_timeout_are_retryable() {
        assert!(TransportError::Connection("refused".into()).is_retryable());
        assert!(TransportError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!TransportError::Auth("bad password".into()).is_retryable());
        assert!(!TransportError::Rejected("spam".into()).is_retryable());
    }

    #[test]
    fn display_includes_detail() {
        let err = TransportError::Connection("host unreachable".into());
        assert_eq!(err.to_string(), "Connection failed: host unreachable");
    }
}
