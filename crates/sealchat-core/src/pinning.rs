//! Key pinning policy on top of [`KeyPinStore`].
//!
//! The first fingerprints seen for a peer are pinned. A later change is
//! logged and, in strict mode, refused with [`Error::KeyChanged`];
//! otherwise the new keys replace the pins.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{info, warn};

use sealchat_crypto::{KeyPinStore, PinCheck};

use crate::config::Config;
use crate::error::{Error, Result};

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

pub struct KeyPins {
    store: Mutex<KeyPinStore>,
    path: Option<PathBuf>,
    strict: bool,
}

impl KeyPins {
    /// Pins kept in memory only.
    pub fn in_memory(strict: bool) -> Self {
        Self {
            store: Mutex::new(KeyPinStore::default()),
            path: None,
            strict,
        }
    }

    /// Pins persisted at `path` (loaded now if the file exists).
    pub fn open(path: Option<PathBuf>, strict: bool) -> Result<Self> {
        let store = match &path {
            Some(path) => KeyPinStore::load(path)?,
            None => KeyPinStore::default(),
        };
        Ok(Self {
            store: Mutex::new(store),
            path,
            strict,
        })
    }

    /// Pins at the configured store path with the configured strictness.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(config.resolved_pin_store_path(), config.strict_key_pinning)
    }

    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Check a peer's current fingerprints, pinning them on first use.
    ///
    /// Either fingerprint may be `None` when only one role is known.
    pub async fn check(
        &self,
        user_id: &str,
        agreement_fingerprint: Option<&str>,
        signing_fingerprint: Option<&str>,
    ) -> Result<()> {
        let mut store = self.store.lock().await;
        let now = unix_now();

        match store.check(user_id, agreement_fingerprint, signing_fingerprint) {
            PinCheck::Matched => {
                store.record(user_id, agreement_fingerprint, signing_fingerprint, now);
                return Ok(());
            }
            PinCheck::TrustOnFirstUse => {
                info!(user_id, "Pinning peer keys on first use");
                store.record(user_id, agreement_fingerprint, signing_fingerprint, now);
            }
            PinCheck::Changed {
                role,
                expected,
                actual,
            } => {
                warn!(user_id, %role, expected, actual, "Peer key changed since first use");
                if self.strict {
                    return Err(Error::KeyChanged {
                        user_id: user_id.to_string(),
                        role,
                    });
                }
                store.repin(user_id, agreement_fingerprint, signing_fingerprint, now);
            }
        }

        if let Some(path) = &self.path {
            store.save(path)?;
        }
        Ok(())
    }
}
