//! `SealChat` E2E Encryption Library
//!
//! Client-side primitives for per-message forward-secret messaging through
//! an untrusted relay. The relay only ever sees [`Envelope`]s.
//!
//! ## Crypto primitives
//!
//! - **Identity**: one X25519 agreement pair + one Ed25519 signing pair per user
//! - **Per message**: fresh X25519 ephemeral pair → ECDH with recipient → HKDF-SHA256
//! - **Encryption**: ChaCha20-Poly1305 AEAD, random 12-byte nonce, single-use key
//! - **Authenticity**: Ed25519 over `ephemeral_public_key || ciphertext || iv`
//! - **Wire text**: unpadded URL-safe base64

pub mod codec;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod keys;
pub mod pin_store;

pub use engine::{EncryptedData, NONCE_SIZE, SessionKey};
pub use envelope::{Envelope, open_message, seal_message, verify_envelope};
pub use error::CryptoError;
pub use identity::Identity;
pub use keys::{
    AgreementKeyPair, AgreementPublicKey, ImportedPublicKey, KeyRole, RoleTaggedKey,
    SigningKeyPair, SigningPublicKey, fingerprint_of, import_public_key,
};
pub use pin_store::{KeyPinStore, PinCheck, PinnedPeer, constant_time_str_eq};
