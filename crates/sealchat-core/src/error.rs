//! Error types for `SealChat` core library.

use thiserror::Error;

use sealchat_crypto::{CryptoError, KeyRole};

/// Result type alias using `SealChat` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `SealChat` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Cryptographic or envelope error
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The relay refused or could not accept an envelope
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// The directory could not be queried or updated
    #[error("Directory error: {0}")]
    Directory(String),

    /// A pinned peer key changed and strict pinning is enabled
    #[error("{role} key of {user_id} changed since it was first seen")]
    KeyChanged { user_id: String, role: KeyRole },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Envelope transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("Envelope rejected: {0}")]
    Rejected(String),

    #[error("Relay unavailable: {0}")]
    Unavailable(String),
}
