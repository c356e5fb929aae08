//! Envelope transport boundary.
//!
//! The relay stores envelopes per conversation and fans them out to live
//! subscribers. It never sees plaintext or private keys, and it hands
//! envelopes back verbatim. [`MemoryRelay`] is an in-process implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use sealchat_crypto::Envelope;

use crate::error::RelayError;

/// Capacity of each conversation's live fan-out channel.
const BROADCAST_CAPACITY: usize = 256;

/// Authenticated message submit/broadcast channel with history.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Store and broadcast an envelope.
    async fn submit(&self, conversation_id: &str, envelope: Envelope) -> Result<(), RelayError>;

    /// Live stream of envelopes submitted after this call.
    async fn subscribe(&self, conversation_id: &str) -> broadcast::Receiver<Envelope>;

    /// All stored envelopes of a conversation, in submission order.
    async fn fetch_history(&self, conversation_id: &str) -> Result<Vec<Envelope>, RelayError>;
}

struct Conversation {
    history: Vec<Envelope>,
    live: broadcast::Sender<Envelope>,
}

impl Conversation {
    fn new() -> Self {
        let (live, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            history: Vec::new(),
            live,
        }
    }
}

/// Thread-safe in-memory relay.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    conversations: Arc<RwLock<HashMap<String, Conversation>>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored envelopes in a conversation.
    pub async fn message_count(&self, conversation_id: &str) -> usize {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .map_or(0, |c| c.history.len())
    }
}

/// Structural admission check: every signed field must be present.
fn check_envelope(envelope: &Envelope) -> Result<(), RelayError> {
    let required = [
        ("senderId", envelope.sender_id()),
        ("ciphertext", envelope.ciphertext()),
        ("iv", envelope.iv()),
        ("signature", envelope.signature()),
        ("ephemeralPublicKey", envelope.ephemeral_public_key()),
    ];
    for (name, value) in required {
        if value.is_empty() {
            return Err(RelayError::Rejected(format!("missing {name}")));
        }
    }
    Ok(())
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn submit(&self, conversation_id: &str, envelope: Envelope) -> Result<(), RelayError> {
        if let Err(e) = check_envelope(&envelope) {
            warn!(conversation_id, error = %e, "Rejected envelope");
            return Err(e);
        }

        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .entry(conversation_id.to_string())
            .or_insert_with(Conversation::new);
        conversation.history.push(envelope.clone());
        // No live subscribers is fine; history still has it.
        let delivered = conversation.live.send(envelope).unwrap_or(0);
        info!(
            conversation_id,
            stored = conversation.history.len(),
            delivered,
            "Envelope stored"
        );
        Ok(())
    }

    async fn subscribe(&self, conversation_id: &str) -> broadcast::Receiver<Envelope> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .entry(conversation_id.to_string())
            .or_insert_with(Conversation::new);
        debug!(conversation_id, "New subscriber");
        conversation.live.subscribe()
    }

    async fn fetch_history(&self, conversation_id: &str) -> Result<Vec<Envelope>, RelayError> {
        Ok(self
            .conversations
            .read()
            .await
            .get(conversation_id)
            .map(|c| c.history.clone())
            .unwrap_or_default())
    }
}
