//! Crypto error types.
//!
//! Variants never carry key material or plaintext, only lengths and
//! short static reasons.

use crate::keys::KeyRole;

/// Errors from cryptographic and envelope operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(&'static str),

    #[error("Key role mismatch: expected {expected} key, got {actual}")]
    KeyRoleMismatch { expected: KeyRole, actual: String },

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(&'static str),

    /// Signature or AEAD check failed. Carries no detail.
    #[error("Message is tampered or forged")]
    TamperedOrForgedMessage,

    #[error("Recipient {user_id} has not published both public keys")]
    MissingRecipientKeys { user_id: String },

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(&'static str),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Encryption failed")]
    EncryptionFailed,

    /// Raw AEAD tag failure. `open_message` never surfaces this directly.
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
