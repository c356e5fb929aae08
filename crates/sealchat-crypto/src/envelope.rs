//! Sealed message envelopes.
//!
//! Each message is encrypted under a key agreed between a fresh, single-use
//! X25519 key pair and the recipient's long-term agreement key, then signed
//! with the sender's long-term Ed25519 key. The signature covers
//! `ephemeral_public_key || ciphertext || iv`, which binds the ephemeral key
//! to the ciphertext and rules out key-substitution.
//!
//! Opening verifies the signature before any decryption is attempted, and
//! reports every signature or AEAD failure as the same
//! [`CryptoError::TamperedOrForgedMessage`].

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::codec;
use crate::engine::{self, NONCE_SIZE, SIGNATURE_SIZE, TAG_SIZE};
use crate::error::CryptoError;
use crate::keys::{AgreementKeyPair, AgreementPublicKey, KEY_SIZE, SigningKeyPair, SigningPublicKey};

/// The wire and storage record for one message.
///
/// Binary fields hold codec text exactly as transported. Fields are private
/// and there are no setters: an envelope is never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    sender_id: String,
    ciphertext: String,
    iv: String,
    signature: String,
    ephemeral_public_key: String,
    /// Unix milliseconds, set by the sender. Display ordering only.
    created_at: i64,
}

impl Envelope {
    /// Reassemble an envelope from stored fields, e.g. a history row.
    ///
    /// No validation happens here; [`open_message`] performs the structural
    /// checks.
    pub const fn from_parts(
        sender_id: String,
        ciphertext: String,
        iv: String,
        signature: String,
        ephemeral_public_key: String,
        created_at: i64,
    ) -> Self {
        Self {
            sender_id,
            ciphertext,
            iv,
            signature,
            ephemeral_public_key,
            created_at,
        }
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn ciphertext(&self) -> &str {
        &self.ciphertext
    }

    pub fn iv(&self) -> &str {
        &self.iv
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn ephemeral_public_key(&self) -> &str {
        &self.ephemeral_public_key
    }

    pub const fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Stable identifier of this exact envelope: hex SHA-256 over every
    /// field. Verbatim re-deliveries share it; any altered copy does not.
    pub fn id(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [
            self.sender_id.as_str(),
            &self.ciphertext,
            &self.iv,
            &self.signature,
            &self.ephemeral_public_key,
        ] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(self.created_at.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String, CryptoError> {
        serde_json::to_string(self).map_err(|e| CryptoError::SerializationError(e.to_string()))
    }

    /// Parse the JSON wire form. Field contents are not validated.
    pub fn from_json(json: &str) -> Result<Self, CryptoError> {
        serde_json::from_str(json).map_err(|e| CryptoError::SerializationError(e.to_string()))
    }
}

/// Decoded binary fields of an envelope.
struct ParsedEnvelope {
    ephemeral_public_key: AgreementPublicKey,
    ciphertext: Vec<u8>,
    iv: [u8; NONCE_SIZE],
    signature: Vec<u8>,
}

impl ParsedEnvelope {
    fn parse(envelope: &Envelope) -> Result<Self, CryptoError> {
        let ephemeral = decode_field(&envelope.ephemeral_public_key, "ephemeral public key")?;
        let ephemeral = <[u8; KEY_SIZE]>::try_from(ephemeral.as_slice())
            .map_err(|_| CryptoError::MalformedEnvelope("ephemeral public key has wrong length"))?;

        let ciphertext = decode_field(&envelope.ciphertext, "ciphertext")?;
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::MalformedEnvelope("ciphertext shorter than auth tag"));
        }

        let iv = decode_field(&envelope.iv, "iv")?;
        let iv = <[u8; NONCE_SIZE]>::try_from(iv.as_slice())
            .map_err(|_| CryptoError::MalformedEnvelope("iv has wrong length"))?;

        let signature = decode_field(&envelope.signature, "signature")?;
        if signature.len() != SIGNATURE_SIZE {
            return Err(CryptoError::MalformedEnvelope("signature has wrong length"));
        }

        Ok(Self {
            ephemeral_public_key: AgreementPublicKey::from_bytes(ephemeral),
            ciphertext,
            iv,
            signature,
        })
    }
}

impl ParsedEnvelope {
    fn verify(&self, sender_id: &str, sender: &SigningPublicKey) -> Result<(), CryptoError> {
        let payload = signed_payload(
            self.ephemeral_public_key.as_bytes(),
            &self.ciphertext,
            &self.iv,
        );
        if engine::verify(sender, &payload, &self.signature) {
            Ok(())
        } else {
            debug!(sender_id, "Envelope signature rejected");
            Err(CryptoError::TamperedOrForgedMessage)
        }
    }
}

fn decode_field(text: &str, field: &'static str) -> Result<Vec<u8>, CryptoError> {
    codec::decode(text).map_err(|_| {
        debug!(field, "Envelope field is not valid codec text");
        CryptoError::MalformedEnvelope("binary field is not valid codec text")
    })
}

/// Bytes covered by the envelope signature.
fn signed_payload(ephemeral: &[u8; KEY_SIZE], ciphertext: &[u8], iv: &[u8; NONCE_SIZE]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(KEY_SIZE + ciphertext.len() + NONCE_SIZE);
    payload.extend_from_slice(ephemeral);
    payload.extend_from_slice(ciphertext);
    payload.extend_from_slice(iv);
    payload
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Seal `plaintext` for the holder of `recipient`.
///
/// Callers must have a published agreement key for the recipient before
/// calling this; a missing key is reported by the caller as
/// [`CryptoError::MissingRecipientKeys`].
pub fn seal_message(
    sender_id: &str,
    plaintext: &[u8],
    recipient: &AgreementPublicKey,
    signer: &SigningKeyPair,
) -> Result<Envelope, CryptoError> {
    let ephemeral = AgreementKeyPair::generate();
    let session_key = engine::derive_session_key(&ephemeral, recipient)?;
    let ephemeral_public = *ephemeral.public_key().as_bytes();
    // The ephemeral secret is never needed again.
    drop(ephemeral);

    let encrypted = engine::encrypt(session_key, plaintext)?;
    let signature = engine::sign(
        signer,
        &signed_payload(&ephemeral_public, &encrypted.ciphertext, &encrypted.iv),
    );

    debug!(
        sender_id,
        plaintext_len = plaintext.len(),
        ciphertext_len = encrypted.ciphertext.len(),
        "Sealed message"
    );

    Ok(Envelope {
        sender_id: sender_id.to_string(),
        ciphertext: codec::encode(&encrypted.ciphertext),
        iv: codec::encode(&encrypted.iv),
        signature: codec::encode(&signature),
        ephemeral_public_key: codec::encode(&ephemeral_public),
        created_at: now_millis(),
    })
}

/// Check an envelope's structure and signature without decrypting it.
///
/// Fails like [`open_message`] does before its decryption step:
/// [`CryptoError::MalformedEnvelope`] or
/// [`CryptoError::TamperedOrForgedMessage`].
pub fn verify_envelope(envelope: &Envelope, sender: &SigningPublicKey) -> Result<(), CryptoError> {
    ParsedEnvelope::parse(envelope)?.verify(&envelope.sender_id, sender)
}

/// Verify and decrypt an envelope.
///
/// Structural problems fail with [`CryptoError::MalformedEnvelope`] before
/// any crypto runs. Signature, key-agreement and AEAD failures all surface
/// as [`CryptoError::TamperedOrForgedMessage`]; decryption is never
/// attempted unless the signature verifies.
pub fn open_message(
    envelope: &Envelope,
    recipient: &AgreementKeyPair,
    sender: &SigningPublicKey,
) -> Result<Vec<u8>, CryptoError> {
    let parsed = ParsedEnvelope::parse(envelope)?;
    parsed.verify(&envelope.sender_id, sender)?;

    let session_key = engine::derive_session_key(recipient, &parsed.ephemeral_public_key)
        .map_err(|_| CryptoError::TamperedOrForgedMessage)?;
    let plaintext = engine::decrypt(session_key, &parsed.ciphertext, &parsed.iv).map_err(|_| {
        debug!(sender_id = %envelope.sender_id, "Envelope failed AEAD authentication");
        CryptoError::TamperedOrForgedMessage
    })?;

    debug!(
        sender_id = %envelope.sender_id,
        plaintext_len = plaintext.len(),
        "Opened message"
    );
    Ok(plaintext)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Parties {
        recipient: AgreementKeyPair,
        sender: SigningKeyPair,
    }

    fn parties() -> Parties {
        Parties {
            recipient: AgreementKeyPair::generate(),
            sender: SigningKeyPair::generate(),
        }
    }

    fn seal(p: &Parties, plaintext: &[u8]) -> Envelope {
        seal_message("bob", plaintext, p.recipient.public_key(), &p.sender).unwrap()
    }

    fn open(p: &Parties, envelope: &Envelope) -> Result<Vec<u8>, CryptoError> {
        open_message(envelope, &p.recipient, p.sender.public_key())
    }

    fn with_field(envelope: &Envelope, field: &str, value: String) -> Envelope {
        let mut e = envelope.clone();
        match field {
            "ciphertext" => e.ciphertext = value,
            "iv" => e.iv = value,
            "signature" => e.signature = value,
            "ephemeral_public_key" => e.ephemeral_public_key = value,
            other => panic!("unknown field {other}"),
        }
        e
    }

    fn field<'a>(envelope: &'a Envelope, name: &str) -> &'a str {
        match name {
            "ciphertext" => envelope.ciphertext(),
            "iv" => envelope.iv(),
            "signature" => envelope.signature(),
            "ephemeral_public_key" => envelope.ephemeral_public_key(),
            other => panic!("unknown field {other}"),
        }
    }

    #[test]
    fn seal_open_roundtrip() {
        let p = parties();
        let envelope = seal(&p, b"hello");
        assert_eq!(open(&p, &envelope).unwrap(), b"hello");
        assert_eq!(envelope.sender_id(), "bob");
        assert!(envelope.created_at() > 0);
    }

    #[test]
    fn seal_open_empty_message() {
        let p = parties();
        let envelope = seal(&p, b"");
        assert!(open(&p, &envelope).unwrap().is_empty());
    }

    #[test]
    fn every_single_bit_flip_is_detected() {
        let p = parties();
        let envelope = seal(&p, b"attack at dawn");

        for name in ["ciphertext", "iv", "signature", "ephemeral_public_key"] {
            let bytes = codec::decode(field(&envelope, name)).unwrap();
            for bit in 0..bytes.len() * 8 {
                let mut flipped = bytes.clone();
                flipped[bit / 8] ^= 1 << (bit % 8);
                let tampered = with_field(&envelope, name, codec::encode(&flipped));
                assert!(
                    matches!(open(&p, &tampered), Err(CryptoError::TamperedOrForgedMessage)),
                    "flip of bit {bit} in {name} was not detected"
                );
            }
        }
    }

    #[test]
    fn wrong_sender_key_is_rejected_even_though_aead_would_pass() {
        let p = parties();
        let envelope = seal(&p, b"hello");
        let impostor = SigningKeyPair::generate();

        let result = open_message(&envelope, &p.recipient, impostor.public_key());
        assert!(matches!(result, Err(CryptoError::TamperedOrForgedMessage)));

        // Skipping verification would have decrypted fine.
        let parsed = ParsedEnvelope::parse(&envelope).unwrap();
        let key = engine::derive_session_key(&p.recipient, &parsed.ephemeral_public_key).unwrap();
        assert_eq!(
            engine::decrypt(key, &parsed.ciphertext, &parsed.iv).unwrap(),
            b"hello"
        );
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let p = parties();
        let envelope = seal(&p, b"hello");
        let other = AgreementKeyPair::generate();
        assert!(matches!(
            open_message(&envelope, &other, p.sender.public_key()),
            Err(CryptoError::TamperedOrForgedMessage)
        ));
    }

    #[test]
    fn resealing_same_plaintext_never_repeats() {
        let p = parties();
        let mut ephemeral = std::collections::HashSet::new();
        let mut ciphertexts = std::collections::HashSet::new();
        let mut ivs = std::collections::HashSet::new();
        for _ in 0..1000 {
            let envelope = seal(&p, b"same plaintext");
            assert!(ephemeral.insert(envelope.ephemeral_public_key().to_string()));
            assert!(ciphertexts.insert(envelope.ciphertext().to_string()));
            assert!(ivs.insert(envelope.iv().to_string()));
        }
    }

    #[test]
    fn undecodable_ephemeral_key_is_malformed() {
        let p = parties();
        let envelope = with_field(&seal(&p, b"hi"), "ephemeral_public_key", "%%%".into());
        assert!(matches!(
            open(&p, &envelope),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn short_ephemeral_key_is_malformed() {
        let p = parties();
        let envelope = with_field(
            &seal(&p, b"hi"),
            "ephemeral_public_key",
            codec::encode(&[1u8; 31]),
        );
        assert!(matches!(
            open(&p, &envelope),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn wrong_iv_length_is_malformed() {
        let p = parties();
        let envelope = with_field(&seal(&p, b"hi"), "iv", codec::encode(&[0u8; 16]));
        assert!(matches!(
            open(&p, &envelope),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn wrong_signature_length_is_malformed() {
        let p = parties();
        let envelope = with_field(&seal(&p, b"hi"), "signature", codec::encode(&[0u8; 70]));
        assert!(matches!(
            open(&p, &envelope),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn truncated_ciphertext_is_malformed() {
        let p = parties();
        let envelope = with_field(&seal(&p, b"hi"), "ciphertext", codec::encode(&[0u8; 8]));
        assert!(matches!(
            open(&p, &envelope),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn spliced_ephemeral_key_is_rejected() {
        let p = parties();
        let first = seal(&p, b"first");
        let second = seal(&p, b"second");
        let spliced = with_field(
            &first,
            "ephemeral_public_key",
            second.ephemeral_public_key().to_string(),
        );
        assert!(matches!(
            open(&p, &spliced),
            Err(CryptoError::TamperedOrForgedMessage)
        ));
    }

    #[test]
    fn json_wire_form_uses_camel_case() {
        let p = parties();
        let envelope = seal(&p, b"hi");
        let json = envelope.to_json().unwrap();
        for key in [
            "senderId",
            "ciphertext",
            "iv",
            "signature",
            "ephemeralPublicKey",
            "createdAt",
        ] {
            assert!(json.contains(&format!("\"{key}\"")), "missing {key}");
        }
        let parsed = Envelope::from_json(&json).unwrap();
        assert_eq!(parsed, envelope);
        assert_eq!(open(&p, &parsed).unwrap(), b"hi");
    }

    #[test]
    fn from_json_rejects_missing_fields() {
        assert!(matches!(
            Envelope::from_json(r#"{"senderId":"bob"}"#),
            Err(CryptoError::SerializationError(_))
        ));
    }

    #[test]
    fn from_parts_reassembles_stored_envelope() {
        let p = parties();
        let envelope = seal(&p, b"stored");
        let restored = Envelope::from_parts(
            envelope.sender_id().to_string(),
            envelope.ciphertext().to_string(),
            envelope.iv().to_string(),
            envelope.signature().to_string(),
            envelope.ephemeral_public_key().to_string(),
            envelope.created_at(),
        );
        assert_eq!(open(&p, &restored).unwrap(), b"stored");
    }

    #[test]
    fn id_is_stable_for_copies_and_changes_with_any_field() {
        let p = parties();
        let envelope = seal(&p, b"id");
        assert_eq!(envelope.id(), envelope.clone().id());
        assert_eq!(envelope.id().len(), 64);

        let tampered = with_field(&envelope, "iv", codec::encode(&[0u8; NONCE_SIZE]));
        assert_ne!(envelope.id(), tampered.id());
        assert_ne!(envelope.id(), seal(&p, b"id").id());
    }

    #[test]
    fn verify_envelope_checks_signature_only() {
        let p = parties();
        let envelope = seal(&p, b"verify");
        assert!(verify_envelope(&envelope, p.sender.public_key()).is_ok());

        let other = SigningKeyPair::generate();
        assert!(matches!(
            verify_envelope(&envelope, other.public_key()),
            Err(CryptoError::TamperedOrForgedMessage)
        ));

        let mut flipped = codec::decode(envelope.ciphertext()).unwrap();
        flipped[0] ^= 1;
        let tampered = with_field(&envelope, "ciphertext", codec::encode(&flipped));
        assert!(matches!(
            verify_envelope(&tampered, p.sender.public_key()),
            Err(CryptoError::TamperedOrForgedMessage)
        ));

        let garbage = with_field(&envelope, "signature", "AAAA".into());
        assert!(matches!(
            verify_envelope(&garbage, p.sender.public_key()),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }
}
