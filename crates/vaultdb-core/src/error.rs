//! Error types for VaultDB core operations.
//!
//! Errors distinguish "not found" from "decryption failed" from I/O trouble,
//! because callers (the CLI, an HTTP layer) map them to different responses.

use thiserror::Error;

/// Result type alias for VaultDB operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Core error type for VaultDB operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// AEAD tag mismatch: wrong password, wrong salt, or tampered data
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Salt or password unavailable
    #[error("Key material missing: {0}")]
    KeyMaterialMissing(String),

    /// Plaintext file still locked after all cleanup retries
    #[error("File locked: {0}")]
    TransientLock(String),

    /// No record for the given identity key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unparsable container, blob or JSON payload
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Invalid caller input (weak password, empty name, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Encryption primitive failure other than authentication
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// Storage backend error (generic)
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite-specific storage error
    #[error("SQLite error: {source}")]
    Sqlite {
        #[from]
        source: rusqlite::Error,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl VaultError {
    /// Status code an HTTP layer should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            VaultError::NotFound(_) => 404,
            VaultError::MalformedInput(_) | VaultError::InvalidInput(_) => 400,
            VaultError::AuthenticationFailure(_) | VaultError::KeyMaterialMissing(_) => 401,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::MalformedInput(err.to_string())
    }
}
