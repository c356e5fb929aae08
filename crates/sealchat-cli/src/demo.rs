//! In-process demo: Alice and Bob talk through the in-memory directory and
//! relay, and Carol (who never published keys) cannot be messaged.

use std::io::{self, Write};
use std::sync::Arc;

use tracing::info;

use sealchat_core::config::Config;
use sealchat_core::{
    ConversationView, Error, MemoryDirectory, MemoryRelay, MessageBody, Messenger,
    MessengerOptions,
};
use sealchat_crypto::{CryptoError, Identity};

const CONVERSATION: &str = "demo";

/// Run the demo with the configured pinning strictness. Pins stay in memory
/// since the demo identities are throwaway.
pub async fn run(config: &Config, message: &str) -> anyhow::Result<()> {
    let options = MessengerOptions {
        strict_key_pinning: config.strict_key_pinning,
        ..MessengerOptions::default()
    };
    let view = run_conversation(message, &options).await?;
    let mut out = io::stdout();
    for m in view.messages() {
        let body = match &m.body {
            MessageBody::Plaintext(text) => text.as_str(),
            MessageBody::Unreadable => "(unreadable)",
            MessageBody::Unavailable => "(sent from another device)",
        };
        writeln!(out, "[{}] {}: {body}", m.created_at, m.sender_id)?;
    }
    Ok(())
}

/// Play the demo conversation and return Bob's view of it.
async fn run_conversation(
    message: &str,
    options: &MessengerOptions,
) -> anyhow::Result<ConversationView> {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();

    let alice = Messenger::with_options(
        Arc::new(Identity::generate("alice")),
        directory.clone(),
        relay.clone(),
        options.clone(),
    )?;
    let bob = Messenger::with_options(
        Arc::new(Identity::generate("bob")),
        directory.clone(),
        relay.clone(),
        options.clone(),
    )?;
    alice.register().await?;
    bob.register().await?;

    let mut live = bob.subscribe(CONVERSATION).await;
    alice.send(CONVERSATION, "bob", message).await?;
    let received = bob.open(&live.recv().await?).await;
    info!(from = %received.sender_id, "Bob received a live message");

    bob.send(CONVERSATION, "alice", "got it").await?;

    match alice.send(CONVERSATION, "carol", "hello?").await {
        Err(Error::Crypto(CryptoError::MissingRecipientKeys { user_id })) => {
            info!(user_id = %user_id, "Message refused: recipient has no published keys");
        }
        Err(e) => return Err(e.into()),
        Ok(_) => anyhow::bail!("carol has no keys but the message was sealed"),
    }

    Ok(bob.history(CONVERSATION).await?)
}
