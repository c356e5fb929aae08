#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Integration tests for the messaging pipeline.
//!
//! Tests the full flow: messenger → directory lookup → seal → relay →
//! history/live stream → open → conversation view, using the in-memory
//! directory and relay.

use std::sync::Arc;

use sealchat_core::{
    ConversationView, Directory, Error, MemoryDirectory, MemoryRelay, MessageBody, Messenger,
    MessengerOptions, PublishedKeys, Relay,
};
use sealchat_crypto::{CryptoError, Envelope, Identity};

type TestMessenger = Messenger<MemoryDirectory, MemoryRelay>;

/// Helper to create a registered messenger sharing `directory` and `relay`.
async fn user(name: &str, directory: &MemoryDirectory, relay: &MemoryRelay) -> TestMessenger {
    let messenger = Messenger::new(
        Arc::new(Identity::generate(name)),
        directory.clone(),
        relay.clone(),
    );
    messenger.register().await.unwrap();
    messenger
}

fn texts(view: &ConversationView) -> Vec<String> {
    view.messages()
        .map(|m| match &m.body {
            MessageBody::Plaintext(t) => t.clone(),
            MessageBody::Unreadable => "<unreadable>".into(),
            MessageBody::Unavailable => "<unavailable>".into(),
        })
        .collect()
}

// =========================================================================
// Send and receive
// =========================================================================

#[tokio::test]
async fn alice_and_bob_exchange_messages() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let alice = user("alice", &directory, &relay).await;
    let bob = user("bob", &directory, &relay).await;

    alice.send("ab", "bob", "hi bob").await.unwrap();
    bob.send("ab", "alice", "hi alice").await.unwrap();
    alice.send("ab", "bob", "how are you?").await.unwrap();

    let bob_view = bob.history("ab").await.unwrap();
    assert_eq!(texts(&bob_view), ["hi bob", "hi alice", "how are you?"]);
    let outgoing: Vec<_> = bob_view.messages().map(|m| m.outgoing).collect();
    assert_eq!(outgoing, [false, true, false]);

    let alice_view = alice.history("ab").await.unwrap();
    assert_eq!(texts(&alice_view), ["hi bob", "hi alice", "how are you?"]);
}

#[tokio::test]
async fn same_text_twice_produces_unrelated_envelopes() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let _alice = user("alice", &directory, &relay).await;
    let bob = user("bob", &directory, &relay).await;

    let first = bob.send("ab", "alice", "hello").await.unwrap();
    let second = bob.send("ab", "alice", "hello").await.unwrap();

    assert_ne!(first.ciphertext(), second.ciphertext());
    assert_ne!(first.ephemeral_public_key(), second.ephemeral_public_key());
    assert_ne!(first.iv(), second.iv());
}

#[tokio::test]
async fn recipient_without_published_keys_is_refused() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let alice = user("alice", &directory, &relay).await;

    let err = alice.send("ac", "carol", "hello?").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Crypto(CryptoError::MissingRecipientKeys { ref user_id }) if user_id == "carol"
    ));
    assert_eq!(relay.message_count("ac").await, 0);
}

#[tokio::test]
async fn relay_only_ever_holds_ciphertext() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let alice = user("alice", &directory, &relay).await;
    let _bob = user("bob", &directory, &relay).await;

    alice.send("ab", "bob", "top secret plans").await.unwrap();

    for envelope in relay.fetch_history("ab").await.unwrap() {
        let json = envelope.to_json().unwrap();
        assert!(!json.contains("top secret"));
    }
}

// =========================================================================
// Tampering and forgery
// =========================================================================

fn flip_first_char(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
    chars.into_iter().collect()
}

#[tokio::test]
async fn tampered_envelope_is_shown_as_unreadable() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let alice = user("alice", &directory, &relay).await;
    let bob = user("bob", &directory, &relay).await;

    let genuine = alice.send("ab", "bob", "pay 10").await.unwrap();
    let tampered = Envelope::from_parts(
        genuine.sender_id().to_string(),
        flip_first_char(genuine.ciphertext()),
        genuine.iv().to_string(),
        genuine.signature().to_string(),
        genuine.ephemeral_public_key().to_string(),
        genuine.created_at() + 1,
    );
    relay.submit("ab", tampered).await.unwrap();

    let view = bob.history("ab").await.unwrap();
    assert_eq!(texts(&view), ["pay 10", "<unreadable>"]);
    assert_eq!(view.unreadable_count(), 1);
}

#[tokio::test]
async fn envelope_claiming_another_sender_is_unreadable() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let _alice = user("alice", &directory, &relay).await;
    let bob = user("bob", &directory, &relay).await;

    // Mallory seals a valid envelope to bob, then relabels it as alice's.
    let mallory = Identity::generate("mallory");
    let forged = mallory
        .seal(b"it's alice, trust me", bob.identity().agreement_public_key())
        .unwrap();
    let relabelled = Envelope::from_parts(
        "alice".into(),
        forged.ciphertext().to_string(),
        forged.iv().to_string(),
        forged.signature().to_string(),
        forged.ephemeral_public_key().to_string(),
        forged.created_at(),
    );
    relay.submit("ab", relabelled).await.unwrap();

    let view = bob.history("ab").await.unwrap();
    assert_eq!(texts(&view), ["<unreadable>"]);
}

// =========================================================================
// Ordering and live delivery
// =========================================================================

#[tokio::test]
async fn history_orders_by_sender_timestamp() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let alice = user("alice", &directory, &relay).await;
    let bob_identity = Arc::new(Identity::generate("bob"));
    let bob = Messenger::new(Arc::clone(&bob_identity), directory.clone(), relay.clone());
    bob.register().await.unwrap();

    let late = alice.send("ab", "bob", "second").await.unwrap();
    let early = alice.send("ab", "bob", "first").await.unwrap();

    // Rebuild a relay whose stored timestamps say "first" was written earlier.
    let reordered = MemoryRelay::new();
    for (envelope, created_at) in [(&late, 2_000), (&early, 1_000)] {
        reordered
            .submit(
                "ab",
                Envelope::from_parts(
                    envelope.sender_id().to_string(),
                    envelope.ciphertext().to_string(),
                    envelope.iv().to_string(),
                    envelope.signature().to_string(),
                    envelope.ephemeral_public_key().to_string(),
                    created_at,
                ),
            )
            .await
            .unwrap();
    }
    let bob_reader = Messenger::new(bob_identity, directory.clone(), reordered);

    // createdAt is not signed, so both still open and sort by it.
    let view = bob_reader.history("ab").await.unwrap();
    assert_eq!(texts(&view), ["first", "second"]);
}

#[tokio::test]
async fn live_and_history_deliveries_are_deduplicated() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let alice = user("alice", &directory, &relay).await;
    let bob = user("bob", &directory, &relay).await;

    let mut live = bob.subscribe("ab").await;
    alice.send("ab", "bob", "once").await.unwrap();

    let mut view = bob.history("ab").await.unwrap();
    let pushed = live.recv().await.unwrap();
    assert!(!view.insert(bob.open(&pushed).await));
    assert_eq!(texts(&view), ["once"]);
}

// =========================================================================
// Key changes
// =========================================================================

#[tokio::test]
async fn strict_pinning_refuses_substituted_directory_keys() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let alice = user("alice", &directory, &relay).await;
    let bob = Messenger::with_options(
        Arc::new(Identity::generate("bob")),
        directory.clone(),
        relay.clone(),
        MessengerOptions {
            strict_key_pinning: true,
            ..MessengerOptions::default()
        },
    )
    .unwrap();
    bob.register().await.unwrap();

    alice.send("ab", "bob", "before").await.unwrap();
    assert_eq!(texts(&bob.history("ab").await.unwrap()), ["before"]);

    // A misbehaving directory now serves someone else's keys for alice.
    let impostor = Identity::generate("alice");
    let (agreement, signing) = impostor.directory_entry();
    directory
        .publish_public_keys("alice", &agreement, &signing)
        .await
        .unwrap();

    assert!(matches!(
        bob.send("ab", "alice", "hello").await,
        Err(Error::KeyChanged { .. })
    ));

    // Nothing is verified against the substituted key: the impostor's
    // message and alice's earlier one both stay unreadable.
    let impostor_messenger = Messenger::new(Arc::new(impostor), directory.clone(), relay.clone());
    impostor_messenger
        .send("ab", "bob", "send money")
        .await
        .unwrap();
    assert_eq!(
        texts(&bob.history("ab").await.unwrap()),
        ["<unreadable>", "<unreadable>"]
    );
}

#[tokio::test]
async fn partial_directory_entry_blocks_sending_but_not_reading() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let alice = user("alice", &directory, &relay).await;
    let bob = user("bob", &directory, &relay).await;

    bob.send("ab", "alice", "hi").await.unwrap();

    // Alice's agreement key disappears from the directory.
    let (_, signing) = alice.identity().directory_entry();
    directory
        .insert(
            "alice",
            PublishedKeys {
                agreement_public_key: None,
                signing_public_key: Some(signing),
            },
        )
        .await;

    assert!(matches!(
        bob.send("ab", "alice", "still there?").await,
        Err(Error::Crypto(CryptoError::MissingRecipientKeys { .. }))
    ));
    assert!(directory.get_public_keys("bob").await.unwrap().is_complete());
    assert_eq!(texts(&alice.history("ab").await.unwrap()), ["hi"]);
}

#[tokio::test]
async fn recipient_missing_signing_key_is_refused() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let alice = user("alice", &directory, &relay).await;
    let bob = user("bob", &directory, &relay).await;

    let (agreement, _) = alice.identity().directory_entry();
    directory
        .insert(
            "alice",
            PublishedKeys {
                agreement_public_key: Some(agreement),
                signing_public_key: None,
            },
        )
        .await;

    assert!(matches!(
        bob.send("ab", "alice", "hello").await,
        Err(Error::Crypto(CryptoError::MissingRecipientKeys { .. }))
    ));
    assert_eq!(relay.message_count("ab").await, 0);
}

#[tokio::test]
async fn relay_altered_copy_of_own_message_is_unreadable() {
    let directory = MemoryDirectory::new();
    let relay = MemoryRelay::new();
    let _alice = user("alice", &directory, &relay).await;
    let bob = user("bob", &directory, &relay).await;

    let genuine = bob.send("ab", "alice", "pay 10").await.unwrap();
    let altered = Envelope::from_parts(
        genuine.sender_id().to_string(),
        flip_first_char(genuine.ciphertext()),
        genuine.iv().to_string(),
        genuine.signature().to_string(),
        genuine.ephemeral_public_key().to_string(),
        genuine.created_at() + 1,
    );
    relay.submit("ab", altered).await.unwrap();

    let view = bob.history("ab").await.unwrap();
    assert_eq!(texts(&view), ["pay 10", "<unreadable>"]);
    assert!(view.messages().all(|m| m.outgoing));
}
