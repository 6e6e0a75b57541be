//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Mail server operation failed.
    #[error("Transport error: {0}")]
    Transport(#[from] maildesk_transport::TransportError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Folder not found.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// Message not found.
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Rule not found.
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// Input rejected before any state change.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation conflicts with existing state (duplicate email,
    /// cross-account move, folder cycle).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential storage error.
    #[error("Credential error: {0}")]
    Credential(#[from] crate::account::credentials::CredentialError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
