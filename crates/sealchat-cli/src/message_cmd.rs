//! Envelope subcommands: seal, open.
//!
//! Work directly on exported keys and envelope JSON files, without a
//! directory or relay in between. Naming the peer with `--peer` checks the
//! key against the configured pin store first.

use std::io::{self, Write};
use std::path::Path;

use sealchat_core::KeyPins;
use sealchat_core::config::Config;
use sealchat_crypto::{AgreementPublicKey, Envelope, Identity, RoleTaggedKey, SigningPublicKey};

use crate::{identity_dir, pin_store_path};

fn load_identity(config: &Config) -> anyhow::Result<Identity> {
    let dir = identity_dir(config)?;
    Identity::load_from_dir(&dir)
        .map_err(|e| anyhow::anyhow!("No identity in {}: {e}. Run: sealchat keygen", dir.display()))
}

fn open_pins(config: &Config) -> anyhow::Result<KeyPins> {
    Ok(KeyPins::open(
        pin_store_path(config),
        config.strict_key_pinning,
    )?)
}

/// Seal `message` for the holder of agreement key `to`.
pub async fn seal(
    config: &Config,
    to: &str,
    peer: Option<&str>,
    message: &str,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let identity = load_identity(config)?;
    let recipient = AgreementPublicKey::import(to.trim())?;
    if let Some(peer) = peer {
        open_pins(config)?
            .check(peer, Some(&recipient.fingerprint()), None)
            .await?;
    }
    let json = seal_to_json(&identity, &recipient, message)?;
    match out {
        Some(path) => std::fs::write(path, json)?,
        None => writeln!(io::stdout(), "{json}")?,
    }
    Ok(())
}

/// Open the envelope JSON in `envelope_path`, sent by the holder of
/// signing key `from`.
pub async fn open(
    config: &Config,
    from: &str,
    peer: Option<&str>,
    envelope_path: &Path,
) -> anyhow::Result<()> {
    let identity = load_identity(config)?;
    let sender = SigningPublicKey::import(from.trim())?;
    if let Some(peer) = peer {
        open_pins(config)?
            .check(peer, None, Some(&sender.fingerprint()))
            .await?;
    }
    let json = std::fs::read_to_string(envelope_path)?;
    let text = open_from_json(&identity, &sender, &json)?;
    writeln!(io::stdout(), "{text}")?;
    Ok(())
}

fn seal_to_json(
    identity: &Identity,
    recipient: &AgreementPublicKey,
    message: &str,
) -> anyhow::Result<String> {
    let envelope = identity.seal(message.as_bytes(), recipient)?;
    Ok(envelope.to_json()?)
}

fn open_from_json(
    identity: &Identity,
    sender: &SigningPublicKey,
    json: &str,
) -> anyhow::Result<String> {
    let envelope = Envelope::from_json(json)?;
    let plaintext = identity.open(&envelope, sender)?;
    String::from_utf8(plaintext).map_err(|_| anyhow::anyhow!("Message is not valid UTF-8"))
}
