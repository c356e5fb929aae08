//! Identity subcommands: keygen, keys.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::path::Path;

use tracing::info;

use sealchat_core::config::Config;
use sealchat_crypto::Identity;

use crate::identity_dir;

/// Generate an identity, or rotate the existing one.
pub fn keygen(config: &Config, rotate: bool) -> anyhow::Result<()> {
    let dir = identity_dir(config)?;
    let identity = generate_or_rotate(&dir, config.user_id.as_deref(), rotate)?;
    info!(
        user_id = identity.user_id(),
        generation = identity.generation(),
        dir = %dir.display(),
        "Identity saved"
    );
    print_public_keys(&mut io::stdout(), &identity)
}

/// Print the stored identity's exported public keys and fingerprints.
pub fn keys(config: &Config, json: bool) -> anyhow::Result<()> {
    let dir = identity_dir(config)?;
    let identity = Identity::load_from_dir(&dir)
        .map_err(|e| anyhow::anyhow!("No identity in {}: {e}. Run: sealchat keygen", dir.display()))?;
    let mut out = io::stdout();
    if json {
        let value = serde_json::json!({
            "userId": identity.user_id(),
            "generation": identity.generation(),
            "agreementPublicKey": identity.agreement().export_public_key(),
            "signingPublicKey": identity.signing().export_public_key(),
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        return Ok(());
    }
    print_public_keys(&mut out, &identity)
}

fn generate_or_rotate(dir: &Path, user_id: Option<&str>, rotate: bool) -> anyhow::Result<Identity> {
    let existing = Identity::is_saved_in(dir);
    let identity = match (existing, rotate) {
        (true, false) => anyhow::bail!(
            "An identity already exists in {}. Use --rotate to replace its keys",
            dir.display()
        ),
        (true, true) => Identity::load_from_dir(dir)?.rotate(),
        (false, _) => {
            let user_id = user_id.ok_or_else(|| {
                anyhow::anyhow!("No user id. Use --user <id> or set SEALCHAT_USER_ID")
            })?;
            Identity::generate(user_id)
        }
    };
    identity.save_to_dir(dir)?;
    Ok(identity)
}

fn print_public_keys(out: &mut impl Write, identity: &Identity) -> anyhow::Result<()> {
    let (agreement_fp, signing_fp) = identity.fingerprints();
    writeln!(out, "User:        {}", identity.user_id())?;
    writeln!(out, "Generation:  {}", identity.generation())?;
    writeln!(out)?;
    writeln!(out, "Agreement key (give to people who message you):")?;
    writeln!(out, "  {}", identity.agreement().export_public_key())?;
    writeln!(out, "  fingerprint {agreement_fp}")?;
    writeln!(out, "Signing key (lets people verify your messages):")?;
    writeln!(out, "  {}", identity.signing().export_public_key())?;
    writeln!(out, "  fingerprint {signing_fp}")?;
    Ok(())
}
