//! Public key directory boundary.
//!
//! The directory maps a user id to that user's current published public
//! keys. It is an external service; [`MemoryDirectory`] is an in-process
//! implementation for tests, demos and embedding.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::Result;

/// Public keys a user has published, in exported text form.
///
/// A user with a missing agreement key cannot currently receive messages;
/// a user with a missing signing key cannot have their messages verified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedKeys {
    pub agreement_public_key: Option<String>,
    pub signing_public_key: Option<String>,
}

impl PublishedKeys {
    /// Whether the user can be messaged and verified.
    pub const fn is_complete(&self) -> bool {
        self.agreement_public_key.is_some() && self.signing_public_key.is_some()
    }
}

/// Directory of published public keys.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Current keys for `user_id`. Unknown users yield empty keys.
    async fn get_public_keys(&self, user_id: &str) -> Result<PublishedKeys>;

    /// Publish (or replace) a user's public keys.
    async fn publish_public_keys(
        &self,
        user_id: &str,
        agreement_public_key: &str,
        signing_public_key: &str,
    ) -> Result<()>;
}

/// Thread-safe in-memory directory. One live entry per user.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    entries: Arc<RwLock<HashMap<String, PublishedKeys>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry verbatim, including partial ones.
    pub async fn insert(&self, user_id: &str, keys: PublishedKeys) {
        self.entries.write().await.insert(user_id.to_string(), keys);
    }

    /// Remove a user's entry.
    pub async fn remove(&self, user_id: &str) -> bool {
        self.entries.write().await.remove(user_id).is_some()
    }

    /// Count of users with an entry.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get_public_keys(&self, user_id: &str) -> Result<PublishedKeys> {
        let keys = self
            .entries
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        debug!(user_id, complete = keys.is_complete(), "Directory lookup");
        Ok(keys)
    }

    async fn publish_public_keys(
        &self,
        user_id: &str,
        agreement_public_key: &str,
        signing_public_key: &str,
    ) -> Result<()> {
        let replaced = self
            .entries
            .write()
            .await
            .insert(
                user_id.to_string(),
                PublishedKeys {
                    agreement_public_key: Some(agreement_public_key.to_string()),
                    signing_public_key: Some(signing_public_key.to_string()),
                },
            )
            .is_some();
        info!(user_id, replaced, "Published public keys");
        Ok(())
    }
}
