//! Trust-on-first-use (TOFU) key pin store.
//!
//! Remembers the fingerprints of each peer's published keys the first time
//! they are fetched from the directory, so a later substitution (a
//! compromised or misbehaving directory handing out different keys) is
//! noticed instead of silently trusted.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;
use crate::keys::KeyRole;

/// Pinned fingerprints for one peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinnedPeer {
    pub user_id: String,
    /// Fingerprint of the peer's agreement public key, if one was published.
    pub agreement_fingerprint: Option<String>,
    /// Fingerprint of the peer's signing public key, if one was published.
    pub signing_fingerprint: Option<String>,
    /// When these keys were first seen (Unix timestamp).
    pub first_seen: i64,
    /// When these keys were last seen (Unix timestamp).
    pub last_seen: i64,
    /// Whether the user compared the fingerprints out of band.
    pub verified: bool,
}

/// Persistent store of pinned peer keys.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeyPinStore {
    /// Map from user id to pinned entry.
    pub peers: HashMap<String, PinnedPeer>,
}

/// Result of checking a peer's current keys against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinCheck {
    /// First time seeing this peer (or this role's key).
    TrustOnFirstUse,
    /// Keys match the pinned fingerprints.
    Matched,
    /// A pinned key changed.
    Changed {
        role: KeyRole,
        expected: String,
        actual: String,
    },
}

/// Compare two strings in constant time.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

impl KeyPinStore {
    /// Load the store from a JSON file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| {
            CryptoError::SerializationError(format!("Failed to parse key pin store: {e}"))
        })
    }

    /// Save the store to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            CryptoError::SerializationError(format!("Failed to serialize key pin store: {e}"))
        })?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check a peer's current fingerprints against the pins.
    ///
    /// A role with no pinned fingerprint (or no current one) is not a
    /// change; the agreement key is checked before the signing key.
    pub fn check(
        &self,
        user_id: &str,
        agreement_fingerprint: Option<&str>,
        signing_fingerprint: Option<&str>,
    ) -> PinCheck {
        let Some(known) = self.peers.get(user_id) else {
            return PinCheck::TrustOnFirstUse;
        };
        let pairs = [
            (
                KeyRole::Agreement,
                known.agreement_fingerprint.as_deref(),
                agreement_fingerprint,
            ),
            (
                KeyRole::Signing,
                known.signing_fingerprint.as_deref(),
                signing_fingerprint,
            ),
        ];
        let mut saw_new_role = false;
        for (role, pinned, current) in pairs {
            match (pinned, current) {
                (Some(pinned), Some(current)) if !constant_time_str_eq(pinned, current) => {
                    return PinCheck::Changed {
                        role,
                        expected: pinned.to_string(),
                        actual: current.to_string(),
                    };
                }
                (None, Some(_)) => saw_new_role = true,
                _ => {}
            }
        }
        if saw_new_role {
            PinCheck::TrustOnFirstUse
        } else {
            PinCheck::Matched
        }
    }

    /// Record a peer's fingerprints (TOFU, or update `last_seen`).
    ///
    /// Fills in roles that were not pinned yet; never overwrites an
    /// existing pin. Use [`KeyPinStore::repin`] for that.
    pub fn record(
        &mut self,
        user_id: &str,
        agreement_fingerprint: Option<&str>,
        signing_fingerprint: Option<&str>,
        now: i64,
    ) {
        let entry = self
            .peers
            .entry(user_id.to_string())
            .or_insert_with(|| PinnedPeer {
                user_id: user_id.to_string(),
                agreement_fingerprint: None,
                signing_fingerprint: None,
                first_seen: now,
                last_seen: now,
                verified: false,
            });
        if entry.agreement_fingerprint.is_none() {
            entry.agreement_fingerprint = agreement_fingerprint.map(str::to_string);
        }
        if entry.signing_fingerprint.is_none() {
            entry.signing_fingerprint = signing_fingerprint.map(str::to_string);
        }
        entry.last_seen = now;
    }

    /// Mark a peer's fingerprints as explicitly verified by the user.
    pub fn mark_verified(&mut self, user_id: &str) {
        if let Some(entry) = self.peers.get_mut(user_id) {
            entry.verified = true;
        }
    }

    /// Replace a peer's pins after the user accepted a key change.
    pub fn repin(
        &mut self,
        user_id: &str,
        agreement_fingerprint: Option<&str>,
        signing_fingerprint: Option<&str>,
        now: i64,
    ) {
        self.peers.insert(
            user_id.to_string(),
            PinnedPeer {
                user_id: user_id.to_string(),
                agreement_fingerprint: agreement_fingerprint.map(str::to_string),
                signing_fingerprint: signing_fingerprint.map(str::to_string),
                first_seen: now,
                last_seen: now,
                verified: false,
            },
        );
    }

    /// Remove a peer from the store.
    pub fn remove(&mut self, user_id: &str) -> bool {
        self.peers.remove(user_id).is_some()
    }
}
