//! Error types for lockbox-core

use thiserror::Error;

/// Result type alias using lockbox-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in lockbox-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid session, or a token the server rejected
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Ciphertext tag did not verify (tampering or wrong key)
    #[error("Integrity check failed for encrypted field")]
    Integrity,

    /// Malformed ciphertext token (base64, length, padding or encoding)
    #[error("Malformed encrypted field: {0}")]
    Format(String),

    /// Cipher could not be initialised
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// Server unreachable or answered with an unexpected status
    #[error("Remote vault unavailable: {message}")]
    RemoteUnavailable {
        status: Option<u16>,
        message: String,
    },

    /// A lock box with this name already exists
    #[error("Lock box already exists: {0}")]
    AlreadyExists(String),

    /// Lock box not found
    #[error("Lock box not found: {0}")]
    NotFound(String),

    /// Update carried no payload fields
    #[error("No data to update")]
    NoDataToUpdate,

    /// Create carried no payload fields
    #[error("Lock box data is required")]
    DataRequired,

    /// Lock box name is empty
    #[error("Lock box name is required")]
    NameRequired,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            status,
            message: message.into(),
        }
    }

    /// Whether the caller should fall back to the local cache.
    pub const fn is_remote_unavailable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable { .. })
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Codec failures are never retried or silently dropped.
    pub const fn is_codec(&self) -> bool {
        matches!(self, Self::Integrity | Self::Format(_) | Self::Cipher(_))
    }
}
