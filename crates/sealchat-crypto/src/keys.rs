//! Role-tagged long-term key pairs.
//!
//! Every identity owns two independent key pairs: an X25519 pair used only
//! to derive per-message keys, and an Ed25519 pair used only to sign
//! envelopes. The public halves are distinct types, so an agreement key can
//! never be handed to signature verification (or the reverse) without a
//! compile error. Their portable text form carries a one-byte role tag, so
//! importing a key for the wrong role fails at runtime as well.

use std::fmt;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::codec;
use crate::error::CryptoError;

/// Length of both X25519 and Ed25519 raw keys.
pub const KEY_SIZE: usize = 32;

/// Length of an exported key: role tag + raw key.
pub const TAGGED_KEY_SIZE: usize = KEY_SIZE + 1;

/// What a public key may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    Agreement,
    Signing,
}

impl KeyRole {
    const fn tag(self) -> u8 {
        match self {
            Self::Agreement => 0x01,
            Self::Signing => 0x02,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::Agreement),
            0x02 => Some(Self::Signing),
            _ => None,
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agreement => f.write_str("agreement"),
            Self::Signing => f.write_str("signing"),
        }
    }
}

/// A public key with a fixed role and a portable, role-tagged text form.
pub trait RoleTaggedKey: Sized {
    const ROLE: KeyRole;

    /// Raw 32-byte key.
    fn key_bytes(&self) -> [u8; KEY_SIZE];

    /// Build from raw key bytes, validating them for this role.
    fn from_key_bytes(bytes: [u8; KEY_SIZE]) -> Result<Self, CryptoError>;

    /// Tagged bytes: `role_tag || key`.
    fn tagged_bytes(&self) -> [u8; TAGGED_KEY_SIZE] {
        let mut out = [0u8; TAGGED_KEY_SIZE];
        out[0] = Self::ROLE.tag();
        out[1..].copy_from_slice(&self.key_bytes());
        out
    }

    /// Portable text form suitable for publishing to the directory.
    fn export(&self) -> String {
        codec::encode(&self.tagged_bytes())
    }

    /// Parse the portable text form, rejecting keys tagged for another role.
    fn import(text: &str) -> Result<Self, CryptoError> {
        let bytes = codec::decode(text)?;
        if bytes.len() != TAGGED_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: TAGGED_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        match KeyRole::from_tag(bytes[0]) {
            Some(role) if role == Self::ROLE => {}
            Some(role) => {
                return Err(CryptoError::KeyRoleMismatch {
                    expected: Self::ROLE,
                    actual: role.to_string(),
                });
            }
            None => {
                return Err(CryptoError::KeyRoleMismatch {
                    expected: Self::ROLE,
                    actual: format!("unknown tag 0x{:02x}", bytes[0]),
                });
            }
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes[1..]);
        Self::from_key_bytes(key)
    }

    /// Colon-separated SHA-256 fingerprint of the tagged key.
    fn fingerprint(&self) -> String {
        fingerprint_of(&self.tagged_bytes())
    }
}

/// Compute a colon-separated hex fingerprint from raw bytes.
pub fn fingerprint_of(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    hash.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

// ---------------------------------------------------------------------------
// Agreement (X25519)
// ---------------------------------------------------------------------------

/// X25519 public key used for key agreement only.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgreementPublicKey(PublicKey);

impl AgreementPublicKey {
    /// Wrap raw, untagged bytes (as carried in an envelope).
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(PublicKey::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        self.0.as_bytes()
    }

    pub(crate) const fn inner(&self) -> &PublicKey {
        &self.0
    }
}

impl fmt::Debug for AgreementPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AgreementPublicKey")
            .field(&hex::encode(self.as_bytes()))
            .finish()
    }
}

impl RoleTaggedKey for AgreementPublicKey {
    const ROLE: KeyRole = KeyRole::Agreement;

    fn key_bytes(&self) -> [u8; KEY_SIZE] {
        *self.as_bytes()
    }

    fn from_key_bytes(bytes: [u8; KEY_SIZE]) -> Result<Self, CryptoError> {
        Ok(Self::from_bytes(bytes))
    }
}

/// X25519 key pair. Has no signing capability.
///
/// The secret is zeroized on drop.
pub struct AgreementKeyPair {
    secret: StaticSecret,
    public: AgreementPublicKey,
}

impl fmt::Debug for AgreementKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgreementKeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl AgreementKeyPair {
    /// Generate a new random agreement key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = AgreementPublicKey(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Reconstruct from raw 32-byte secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut arr = secret_array(bytes)?;
        let secret = StaticSecret::from(arr);
        arr.zeroize();
        let public = AgreementPublicKey(PublicKey::from(&secret));
        Ok(Self { secret, public })
    }

    pub const fn public_key(&self) -> &AgreementPublicKey {
        &self.public
    }

    /// Secret key bytes for persistence. Zeroized when the wrapper drops.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Portable text form of the public half.
    pub fn export_public_key(&self) -> String {
        self.public.export()
    }

    pub(crate) const fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

// ---------------------------------------------------------------------------
// Signing (Ed25519)
// ---------------------------------------------------------------------------

/// Ed25519 public key used for signature verification only.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SigningPublicKey(VerifyingKey);

impl SigningPublicKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        self.0.as_bytes()
    }

    pub(crate) const fn inner(&self) -> &VerifyingKey {
        &self.0
    }
}

impl fmt::Debug for SigningPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SigningPublicKey")
            .field(&hex::encode(self.as_bytes()))
            .finish()
    }
}

impl RoleTaggedKey for SigningPublicKey {
    const ROLE: KeyRole = KeyRole::Signing;

    fn key_bytes(&self) -> [u8; KEY_SIZE] {
        *self.as_bytes()
    }

    fn from_key_bytes(bytes: [u8; KEY_SIZE]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey("not a valid Ed25519 point"))
    }
}

/// Ed25519 key pair. Has no key-agreement capability.
///
/// The signing key is zeroized on drop.
pub struct SigningKeyPair {
    signing_key: SigningKey,
    public: SigningPublicKey,
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SigningKeyPair {
    /// Generate a new random signing key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = SigningPublicKey(signing_key.verifying_key());
        Self {
            signing_key,
            public,
        }
    }

    /// Reconstruct from a raw 32-byte seed.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut arr = secret_array(bytes)?;
        let signing_key = SigningKey::from_bytes(&arr);
        arr.zeroize();
        let public = SigningPublicKey(signing_key.verifying_key());
        Ok(Self {
            signing_key,
            public,
        })
    }

    pub const fn public_key(&self) -> &SigningPublicKey {
        &self.public
    }

    /// Seed bytes for persistence. Zeroized when the wrapper drops.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; KEY_SIZE]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Portable text form of the public half.
    pub fn export_public_key(&self) -> String {
        self.public.export()
    }

    pub(crate) const fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

// ---------------------------------------------------------------------------
// Role-dispatched import
// ---------------------------------------------------------------------------

/// A public key imported for a role chosen at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportedPublicKey {
    Agreement(AgreementPublicKey),
    Signing(SigningPublicKey),
}

impl ImportedPublicKey {
    pub const fn role(&self) -> KeyRole {
        match self {
            Self::Agreement(_) => KeyRole::Agreement,
            Self::Signing(_) => KeyRole::Signing,
        }
    }
}

/// Import a published key for `role`. Fails with
/// [`CryptoError::KeyRoleMismatch`] if it was exported for the other role.
pub fn import_public_key(text: &str, role: KeyRole) -> Result<ImportedPublicKey, CryptoError> {
    match role {
        KeyRole::Agreement => AgreementPublicKey::import(text).map(ImportedPublicKey::Agreement),
        KeyRole::Signing => SigningPublicKey::import(text).map(ImportedPublicKey::Signing),
    }
}

fn secret_array(bytes: &[u8]) -> Result<[u8; KEY_SIZE], CryptoError> {
    if bytes.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(bytes);
    Ok(arr)
}
