//! Error types for the registry client.

use thiserror::Error;

use crate::transport::TransportError;

/// Main error type for registry client operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller was cancelled while waiting for a quota slot
    #[error("Submission cancelled while waiting for admission")]
    Cancelled,

    /// The submission was admitted but the transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RegistryError::Cancelled)
    }
}

/// Result type alias for registry client operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
