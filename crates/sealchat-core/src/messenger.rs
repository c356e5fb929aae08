//! Client-side messaging pipeline.
//!
//! Glues an [`Identity`] to a [`Directory`] and a [`Relay`]:
//!
//! - **send**: look up recipient keys → seal → submit
//! - **open**: look up sender signing key → verify + decrypt → display
//!
//! The identity is passed in explicitly; nothing here reads keys from
//! ambient storage. Per-message failures never abort a history load: they
//! become [`MessageBody::Unreadable`] entries.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use sealchat_crypto::{
    AgreementPublicKey, CryptoError, Envelope, Identity, RoleTaggedKey, SigningPublicKey,
};

use crate::config::Config;
use crate::conversation::{ConversationView, DisplayMessage, MessageBody};
use crate::directory::{Directory, PublishedKeys};
use crate::error::Result;
use crate::pinning::KeyPins;
use crate::relay::Relay;

/// Sent plaintexts kept per messenger unless configured otherwise.
pub const DEFAULT_SENT_CACHE_CAPACITY: usize = 1000;

/// Messenger behaviour knobs.
#[derive(Debug, Clone)]
pub struct MessengerOptions {
    /// Refuse peers whose keys changed since first use instead of re-pinning.
    pub strict_key_pinning: bool,
    /// Where to persist key pins. `None` keeps them in memory only.
    pub pin_store_path: Option<PathBuf>,
    /// How many sent plaintexts to remember. Oldest are dropped first.
    pub sent_cache_capacity: usize,
}

impl Default for MessengerOptions {
    fn default() -> Self {
        Self {
            strict_key_pinning: false,
            pin_store_path: None,
            sent_cache_capacity: DEFAULT_SENT_CACHE_CAPACITY,
        }
    }
}

impl MessengerOptions {
    /// Pinning settings taken from the resolved configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            strict_key_pinning: config.strict_key_pinning,
            pin_store_path: config.resolved_pin_store_path(),
            ..Self::default()
        }
    }
}

/// Bounded map of envelope id to sent plaintext, evicting oldest first.
#[derive(Debug)]
struct SentCache {
    capacity: usize,
    order: VecDeque<String>,
    texts: HashMap<String, String>,
}

impl SentCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            texts: HashMap::new(),
        }
    }

    fn insert(&mut self, envelope_id: String, text: String) {
        if self.capacity == 0 {
            return;
        }
        if self.texts.insert(envelope_id.clone(), text).is_none() {
            self.order.push_back(envelope_id);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.texts.remove(&oldest);
            }
        }
    }

    fn get(&self, envelope_id: &str) -> Option<&String> {
        self.texts.get(envelope_id)
    }

    fn remove(&mut self, envelope_id: &str) {
        if self.texts.remove(envelope_id).is_some() {
            self.order.retain(|id| id != envelope_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.texts.len()
    }
}

pub struct Messenger<D, R> {
    identity: Arc<Identity>,
    directory: D,
    relay: R,
    pins: KeyPins,
    /// Plaintext of our own recent sent messages, keyed by [`Envelope::id`].
    /// Holds at most `sent_cache_capacity` entries; older own messages show
    /// as [`MessageBody::Unavailable`].
    sent: RwLock<SentCache>,
}

impl<D: Directory, R: Relay> Messenger<D, R> {
    /// Messenger with default options and in-memory pins.
    pub fn new(identity: Arc<Identity>, directory: D, relay: R) -> Self {
        Self {
            identity,
            directory,
            relay,
            pins: KeyPins::in_memory(false),
            sent: RwLock::new(SentCache::new(DEFAULT_SENT_CACHE_CAPACITY)),
        }
    }

    /// Messenger with explicit options, loading persisted pins if any.
    pub fn with_options(
        identity: Arc<Identity>,
        directory: D,
        relay: R,
        options: MessengerOptions,
    ) -> Result<Self> {
        Ok(Self {
            identity,
            directory,
            relay,
            pins: KeyPins::open(options.pin_store_path, options.strict_key_pinning)?,
            sent: RwLock::new(SentCache::new(options.sent_cache_capacity)),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub const fn directory(&self) -> &D {
        &self.directory
    }

    pub const fn relay(&self) -> &R {
        &self.relay
    }

    /// Publish this identity's public keys to the directory.
    pub async fn register(&self) -> Result<()> {
        let (agreement, signing) = self.identity.directory_entry();
        self.directory
            .publish_public_keys(self.identity.user_id(), &agreement, &signing)
            .await
    }

    /// Seal `text` for `recipient_id` and submit it to `conversation_id`.
    ///
    /// Fails with [`CryptoError::MissingRecipientKeys`] before any crypto
    /// runs unless the recipient has published both public keys.
    pub async fn send(
        &self,
        conversation_id: &str,
        recipient_id: &str,
        text: &str,
    ) -> Result<Envelope> {
        let keys = self.directory.get_public_keys(recipient_id).await?;
        let (Some(agreement_text), Some(signing_text)) = (
            keys.agreement_public_key.as_deref(),
            keys.signing_public_key.as_deref(),
        ) else {
            warn!(
                recipient_id,
                has_agreement_key = keys.agreement_public_key.is_some(),
                has_signing_key = keys.signing_public_key.is_some(),
                "Recipient has not published both public keys"
            );
            return Err(CryptoError::MissingRecipientKeys {
                user_id: recipient_id.to_string(),
            }
            .into());
        };
        let recipient_key = AgreementPublicKey::import(agreement_text)?;
        let recipient_signing = SigningPublicKey::import(signing_text)?;
        self.pins
            .check(
                recipient_id,
                Some(&recipient_key.fingerprint()),
                Some(&recipient_signing.fingerprint()),
            )
            .await?;

        let envelope = self.identity.seal(text.as_bytes(), &recipient_key)?;
        let envelope_id = envelope.id();
        self.sent
            .write()
            .await
            .insert(envelope_id.clone(), text.to_string());

        if let Err(e) = self.relay.submit(conversation_id, envelope.clone()).await {
            self.sent.write().await.remove(&envelope_id);
            return Err(e.into());
        }
        info!(conversation_id, recipient_id, "Message sent");
        Ok(envelope)
    }

    /// Resolve one envelope into a display message. Never fails.
    pub async fn open(&self, envelope: &Envelope) -> DisplayMessage {
        let mut cache = HashMap::new();
        self.open_cached(envelope, &mut cache).await
    }

    /// Fetch and resolve a conversation's full history.
    pub async fn history(&self, conversation_id: &str) -> Result<ConversationView> {
        let envelopes = self.relay.fetch_history(conversation_id).await?;
        let mut cache = HashMap::new();
        let mut view = ConversationView::new();
        for envelope in &envelopes {
            view.insert(self.open_cached(envelope, &mut cache).await);
        }
        debug!(
            conversation_id,
            total = view.len(),
            unreadable = view.unreadable_count(),
            "Loaded history"
        );
        Ok(view)
    }

    /// Live stream of envelopes for a conversation; pass each to
    /// [`Messenger::open`].
    pub async fn subscribe(&self, conversation_id: &str) -> broadcast::Receiver<Envelope> {
        self.relay.subscribe(conversation_id).await
    }

    async fn open_cached(
        &self,
        envelope: &Envelope,
        sender_keys: &mut HashMap<String, Option<SigningPublicKey>>,
    ) -> DisplayMessage {
        let sender_id = envelope.sender_id();
        let outgoing = sender_id == self.identity.user_id();

        let body = if outgoing {
            self.own_body(envelope).await
        } else {
            let key = match sender_keys.get(sender_id) {
                Some(key) => *key,
                None => {
                    let key = self.sender_signing_key(sender_id).await;
                    sender_keys.insert(sender_id.to_string(), key);
                    key
                }
            };
            match key {
                Some(key) => self.decrypt_body(envelope, &key),
                None => MessageBody::Unreadable,
            }
        };

        DisplayMessage {
            sender_id: sender_id.to_string(),
            created_at: envelope.created_at(),
            body,
            outgoing,
            envelope_id: envelope.id(),
        }
    }

    /// Body of an envelope that claims to be ours: it must carry our own
    /// valid signature before the local plaintext copy is shown.
    async fn own_body(&self, envelope: &Envelope) -> MessageBody {
        if let Err(e) = self.identity.verify_own(envelope) {
            warn!(error = %e, "Envelope under our own id fails verification");
            return MessageBody::Unreadable;
        }
        self.sent
            .read()
            .await
            .get(&envelope.id())
            .map_or(MessageBody::Unavailable, |text| {
                MessageBody::Plaintext(text.clone())
            })
    }

    fn decrypt_body(&self, envelope: &Envelope, sender: &SigningPublicKey) -> MessageBody {
        match self.identity.open(envelope, sender) {
            Ok(bytes) => String::from_utf8(bytes).map_or_else(
                |_| {
                    warn!(sender_id = envelope.sender_id(), "Message is not valid UTF-8");
                    MessageBody::Unreadable
                },
                MessageBody::Plaintext,
            ),
            Err(e) => {
                warn!(sender_id = envelope.sender_id(), error = %e, "Message cannot be opened");
                MessageBody::Unreadable
            }
        }
    }

    /// Look up, import and pin-check a sender's signing key.
    async fn sender_signing_key(&self, sender_id: &str) -> Option<SigningPublicKey> {
        let keys = match self.directory.get_public_keys(sender_id).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(sender_id, error = %e, "Sender key lookup failed");
                return None;
            }
        };
        let Some(text) = keys.signing_public_key.as_deref() else {
            warn!(sender_id, "Sender has no published signing key");
            return None;
        };
        let key = match SigningPublicKey::import(text) {
            Ok(key) => key,
            Err(e) => {
                warn!(sender_id, error = %e, "Sender signing key is invalid");
                return None;
            }
        };
        let agreement_fingerprint = agreement_fingerprint(&keys);
        if let Err(e) = self
            .pins
            .check(
                sender_id,
                agreement_fingerprint.as_deref(),
                Some(&key.fingerprint()),
            )
            .await
        {
            warn!(sender_id, error = %e, "Sender key rejected");
            return None;
        }
        Some(key)
    }
}

fn agreement_fingerprint(keys: &PublishedKeys) -> Option<String> {
    keys.agreement_public_key
        .as_deref()
        .and_then(|text| AgreementPublicKey::import(text).ok())
        .map(|key| key.fingerprint())
}
