//! Local identity: the two long-term key pairs of one user.
//!
//! An `Identity` is created once, persisted to a private key directory, and
//! passed explicitly into every seal/open call. It is never mutated: rotating
//! keys produces a new `Identity` with the next generation number. All
//! secret material is zeroized when the value is dropped.
//!
//! Key directory layout:
//!
//! ```text
//! <dir>/identity.json       {"user_id": "...", "generation": 0}
//! <dir>/agreement-<N>.key   32-byte X25519 secret (mode 0600)
//! <dir>/signing-<N>.key     32-byte Ed25519 seed (mode 0600)
//! ```
//!
//! Key files are named by generation and `identity.json` is replaced by
//! rename after they are written, so an interrupted save leaves the
//! previous generation loadable.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::envelope::{self, Envelope};
use crate::error::CryptoError;
use crate::keys::{
    AgreementKeyPair, AgreementPublicKey, KEY_SIZE, RoleTaggedKey, SigningKeyPair,
    SigningPublicKey,
};

const METADATA_FILE: &str = "identity.json";
const METADATA_TMP_FILE: &str = "identity.json.tmp";

fn agreement_key_file(generation: u32) -> String {
    format!("agreement-{generation}.key")
}

fn signing_key_file(generation: u32) -> String {
    format!("signing-{generation}.key")
}

#[derive(Debug, Serialize, Deserialize)]
struct IdentityMetadata {
    user_id: String,
    generation: u32,
}

/// Long-term keys of a single user.
pub struct Identity {
    user_id: String,
    generation: u32,
    agreement: AgreementKeyPair,
    signing: SigningKeyPair,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("generation", &self.generation)
            .field("agreement", &self.agreement)
            .field("signing", &self.signing)
            .finish()
    }
}

impl Identity {
    /// Generate a fresh identity (generation 0).
    pub fn generate(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            generation: 0,
            agreement: AgreementKeyPair::generate(),
            signing: SigningKeyPair::generate(),
        }
    }

    /// Build an identity from existing key pairs.
    pub fn from_key_pairs(
        user_id: impl Into<String>,
        generation: u32,
        agreement: AgreementKeyPair,
        signing: SigningKeyPair,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            generation,
            agreement,
            signing,
        }
    }

    /// A new identity for the same user with fresh keys and the next
    /// generation number. `self` is left untouched.
    pub fn rotate(&self) -> Self {
        Self {
            user_id: self.user_id.clone(),
            generation: self.generation.saturating_add(1),
            agreement: AgreementKeyPair::generate(),
            signing: SigningKeyPair::generate(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub const fn generation(&self) -> u32 {
        self.generation
    }

    pub const fn agreement(&self) -> &AgreementKeyPair {
        &self.agreement
    }

    pub const fn signing(&self) -> &SigningKeyPair {
        &self.signing
    }

    pub const fn agreement_public_key(&self) -> &AgreementPublicKey {
        self.agreement.public_key()
    }

    pub const fn signing_public_key(&self) -> &SigningPublicKey {
        self.signing.public_key()
    }

    /// Fingerprints of both public keys, for out-of-band comparison.
    pub fn fingerprints(&self) -> (String, String) {
        (
            self.agreement_public_key().fingerprint(),
            self.signing_public_key().fingerprint(),
        )
    }

    /// Exported `(agreement, signing)` public keys to publish in a directory.
    pub fn directory_entry(&self) -> (String, String) {
        (
            self.agreement.export_public_key(),
            self.signing.export_public_key(),
        )
    }

    /// Seal a message from this identity to `recipient`.
    pub fn seal(
        &self,
        plaintext: &[u8],
        recipient: &AgreementPublicKey,
    ) -> Result<Envelope, CryptoError> {
        envelope::seal_message(&self.user_id, plaintext, recipient, &self.signing)
    }

    /// Open a message addressed to this identity.
    pub fn open(
        &self,
        envelope: &Envelope,
        sender: &SigningPublicKey,
    ) -> Result<Vec<u8>, CryptoError> {
        envelope::open_message(envelope, &self.agreement, sender)
    }

    /// Check that an envelope claiming to come from this identity carries
    /// a valid signature by its signing key. No decryption is attempted.
    pub fn verify_own(&self, envelope: &Envelope) -> Result<(), CryptoError> {
        envelope::verify_envelope(envelope, self.signing.public_key())
    }

    /// Whether `dir` holds a saved identity.
    pub fn is_saved_in(dir: &Path) -> bool {
        dir.join(METADATA_FILE).exists()
    }

    /// Persist to a private key directory.
    ///
    /// Writes this generation's key files, then commits by renaming the
    /// metadata into place. Key files of other generations are removed
    /// only after the commit.
    pub fn save_to_dir(&self, dir: &Path) -> Result<(), CryptoError> {
        std::fs::create_dir_all(dir)?;
        write_secret_file(
            &dir.join(agreement_key_file(self.generation)),
            &*self.agreement.secret_bytes(),
        )?;
        write_secret_file(
            &dir.join(signing_key_file(self.generation)),
            &*self.signing.secret_bytes(),
        )?;

        let metadata = IdentityMetadata {
            user_id: self.user_id.clone(),
            generation: self.generation,
        };
        let json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| CryptoError::SerializationError(e.to_string()))?;
        let staged = dir.join(METADATA_TMP_FILE);
        std::fs::write(&staged, json)?;
        std::fs::rename(&staged, dir.join(METADATA_FILE))?;

        self.remove_stale_key_files(dir)?;
        Ok(())
    }

    fn remove_stale_key_files(&self, dir: &Path) -> Result<(), CryptoError> {
        let current = [
            agreement_key_file(self.generation),
            signing_key_file(self.generation),
        ];
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let is_key_file = (name.starts_with("agreement-") || name.starts_with("signing-"))
                && name.ends_with(".key");
            if !is_key_file || current.iter().any(|c| c == name) {
                continue;
            }
            if let Err(e) = std::fs::remove_file(entry.path()) {
                warn!(file = name, error = %e, "Failed to remove old key file");
            }
        }
        Ok(())
    }

    /// Load from a key directory written by [`Identity::save_to_dir`].
    pub fn load_from_dir(dir: &Path) -> Result<Self, CryptoError> {
        let data = std::fs::read_to_string(dir.join(METADATA_FILE))?;
        let metadata: IdentityMetadata = serde_json::from_str(&data).map_err(|e| {
            CryptoError::SerializationError(format!("Failed to parse identity metadata: {e}"))
        })?;

        let mut agreement_bytes =
            read_secret_file(&dir.join(agreement_key_file(metadata.generation)))?;
        let agreement = AgreementKeyPair::from_secret_bytes(&agreement_bytes);
        agreement_bytes.zeroize();

        let mut signing_bytes =
            read_secret_file(&dir.join(signing_key_file(metadata.generation)))?;
        let signing = SigningKeyPair::from_secret_bytes(&signing_bytes);
        signing_bytes.zeroize();

        Ok(Self {
            user_id: metadata.user_id,
            generation: metadata.generation,
            agreement: agreement?,
            signing: signing?,
        })
    }

    /// Load the identity in `dir`, or generate and save one for `user_id`.
    ///
    /// Refuses to load an identity that belongs to a different user.
    pub fn load_or_generate(dir: &Path, user_id: &str) -> Result<Self, CryptoError> {
        if Self::is_saved_in(dir) {
            let identity = Self::load_from_dir(dir)?;
            if identity.user_id != user_id {
                return Err(CryptoError::IoError(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "Key directory {} belongs to user {}",
                        dir.display(),
                        identity.user_id
                    ),
                )));
            }
            Ok(identity)
        } else {
            let identity = Self::generate(user_id);
            identity.save_to_dir(dir)?;
            info!(
                user_id,
                agreement_fingerprint = %identity.agreement_public_key().fingerprint(),
                signing_fingerprint = %identity.signing_public_key().fingerprint(),
                "Generated new identity"
            );
            Ok(identity)
        }
    }
}

/// Write a secret key file with restrictive permissions.
fn write_secret_file(path: &Path, bytes: &[u8]) -> Result<(), CryptoError> {
    std::fs::write(path, bytes)?;

    // Set restrictive permissions on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Read a 32-byte secret key file.
///
/// Reads directly into a fixed-size array to avoid heap-allocated `Vec`
/// whose prior allocations may leave key material in freed memory.
///
/// On Unix, verifies file permissions are 0600 (owner-only) before reading.
fn read_secret_file(path: &Path) -> Result<[u8; KEY_SIZE], CryptoError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path)?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o600 {
            return Err(CryptoError::IoError(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!(
                    "Key file {} has insecure permissions: {mode:o} (expected 600)",
                    path.display()
                ),
            )));
        }
    }

    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; KEY_SIZE];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
