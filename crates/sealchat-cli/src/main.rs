//! `SealChat` CLI
//!
//! Manage a messaging identity and seal/open envelopes from the terminal.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use sealchat_cli::{demo, identity_cmd, message_cmd};
use sealchat_core::config::load_config;
use sealchat_core::tracing_init::{default_filter, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "sealchat")]
#[command(version, about = "End-to-end encrypted messaging client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// User id to act as
    #[arg(long, global = true, env = "SEALCHAT_USER_ID")]
    user: Option<String>,

    /// Identity key directory
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new identity.
    Keygen {
        /// Replace the keys of an existing identity.
        #[arg(long)]
        rotate: bool,
    },
    /// Show exported public keys and fingerprints.
    Keys {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Seal a message for a recipient's agreement key.
    Seal {
        /// Recipient agreement public key.
        #[arg(long)]
        to: String,
        /// Recipient user id; checks the key against the pin store.
        #[arg(long)]
        peer: Option<String>,
        /// Message text.
        #[arg(short, long)]
        message: String,
        /// Write the envelope here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Open an envelope sent by the holder of a signing key.
    Open {
        /// Sender signing public key.
        #[arg(long)]
        from: String,
        /// Sender user id; checks the key against the pin store.
        #[arg(long)]
        peer: Option<String>,
        /// Envelope JSON file.
        #[arg(long)]
        envelope: PathBuf,
    },
    /// Run an in-memory Alice/Bob conversation.
    Demo {
        #[arg(short, long, default_value = "hello from alice")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config()?;
    if let Some(user) = cli.user {
        config.user_id = Some(user);
    }
    if let Some(dir) = cli.dir {
        config.identity_dir = Some(dir);
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    config.log_json |= cli.log_json;

    init_tracing(&default_filter(&config.log_level), config.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting sealchat");

    match cli.command {
        Command::Keygen { rotate } => identity_cmd::keygen(&config, rotate),
        Command::Keys { json } => identity_cmd::keys(&config, json),
        Command::Seal {
            to,
            peer,
            message,
            out,
        } => message_cmd::seal(&config, &to, peer.as_deref(), &message, out.as_deref()).await,
        Command::Open {
            from,
            peer,
            envelope,
        } => message_cmd::open(&config, &from, peer.as_deref(), &envelope).await,
        Command::Demo { message } => demo::run(&config, &message).await,
    }
}
