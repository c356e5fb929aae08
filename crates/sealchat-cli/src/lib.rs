//! `SealChat` CLI library
//!
//! Subcommand implementations for the `sealchat` binary.

pub mod demo;
pub mod identity_cmd;
pub mod message_cmd;

use std::path::{Path, PathBuf};

use sealchat_core::config::Config;

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map_or_else(|| path.to_path_buf(), |h| h.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}

/// Identity key directory from the resolved configuration.
pub fn identity_dir(config: &Config) -> anyhow::Result<PathBuf> {
    config
        .resolved_identity_dir()
        .map(|d| expand_home(&d))
        .ok_or_else(|| anyhow::anyhow!("Cannot determine identity directory. Use --dir <path>"))
}

/// Key pin store from the resolved configuration. `None` keeps pins in memory.
pub fn pin_store_path(config: &Config) -> Option<PathBuf> {
    config.resolved_pin_store_path().map(|p| expand_home(&p))
}
