//! Stateless crypto engine.
//!
//! Key agreement (X25519 -> HKDF-SHA256), single-use AEAD
//! (ChaCha20-Poly1305 with a random 96-bit nonce), and Ed25519
//! signing/verification. Nothing here performs I/O or keeps state between
//! calls.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use ed25519_dalek::Signer;
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::keys::{AgreementKeyPair, AgreementPublicKey, SigningKeyPair, SigningPublicKey};

/// HKDF info string for per-message key derivation.
const HKDF_INFO: &[u8] = b"sealchat-envelope-key-v1";

/// HKDF salt for domain separation (recommended by RFC 5869).
const HKDF_SALT: &[u8] = b"sealchat-envelope-hkdf-salt-v1";

/// Nonce size for ChaCha20-Poly1305.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag appended to every ciphertext.
pub const TAG_SIZE: usize = 16;

/// Ed25519 signature size.
pub const SIGNATURE_SIZE: usize = 64;

/// Symmetric key derived for exactly one encrypt or decrypt call.
///
/// Move-only: [`encrypt`] and [`decrypt`] consume it, so the same key can
/// never protect two messages. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; 32],
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

/// AEAD output.
#[derive(Debug, Clone)]
pub struct EncryptedData {
    /// ChaCha20-Poly1305 ciphertext (includes 16-byte auth tag).
    pub ciphertext: Vec<u8>,
    /// 12-byte nonce used for this encryption.
    pub iv: [u8; NONCE_SIZE],
}

/// Derive the symmetric key shared between `local` and `peer`.
///
/// Deterministic in its inputs: the sender (ephemeral secret, recipient
/// public) and the recipient (long-term secret, ephemeral public) arrive at
/// the same key. Rejects low-order peer keys that would yield an all-zero
/// shared secret.
pub fn derive_session_key(
    local: &AgreementKeyPair,
    peer: &AgreementPublicKey,
) -> Result<SessionKey, CryptoError> {
    let shared = local.secret().diffie_hellman(peer.inner());
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidPublicKey("non-contributory agreement key"));
    }
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared.as_bytes());
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    Ok(SessionKey { key })
}

/// Encrypt `plaintext` under a fresh random nonce, consuming the key.
pub fn encrypt(key: SessionKey, plaintext: &[u8]) -> Result<EncryptedData, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.key));
    drop(key);

    let mut iv = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(EncryptedData { ciphertext, iv })
}

/// Decrypt and authenticate, consuming the key.
///
/// Returns [`CryptoError::AuthenticationFailed`] and no plaintext at all if
/// the tag does not verify.
pub fn decrypt(
    key: SessionKey,
    ciphertext: &[u8],
    iv: &[u8; NONCE_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.key));
    drop(key);

    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Sign `message` with a long-term signing key.
pub fn sign(signer: &SigningKeyPair, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
    signer.signing_key().sign(message).to_bytes()
}

/// Verify an Ed25519 signature.
///
/// Never errors: wrong-length, malformed and non-matching signatures all
/// return `false`. Uses strict verification, which rejects malleable and
/// small-order encodings.
pub fn verify(public: &SigningPublicKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(bytes) = <[u8; SIGNATURE_SIZE]>::try_from(signature) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(&bytes);
    public.inner().verify_strict(message, &signature).is_ok()
}
