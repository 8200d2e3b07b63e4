//! Error types for IdeaVault

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum VaultError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    /// A uniqueness constraint rejected the write (idea hash, email, ...)
    #[error("Duplicate entry: {0}")]
    Duplicate(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::SerializationError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, VaultError>;
