//! Configuration resolution for `SealChat`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/sealchat/settings.json)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete `SealChat` client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// User id this client acts as.
    pub user_id: Option<String>,
    /// Directory holding the identity key files.
    pub identity_dir: Option<PathBuf>,
    /// JSON file with pinned peer key fingerprints.
    pub pin_store_path: Option<PathBuf>,
    /// Refuse to talk to peers whose keys changed since first use.
    pub strict_key_pinning: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: None,
            identity_dir: None,
            pin_store_path: None,
            strict_key_pinning: false,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Identity directory, falling back to the platform data directory.
    pub fn resolved_identity_dir(&self) -> Option<PathBuf> {
        self.identity_dir
            .clone()
            .or_else(|| config_dir().map(|d| d.join("identity")))
    }

    /// Pin store path, falling back to the platform data directory.
    pub fn resolved_pin_store_path(&self) -> Option<PathBuf> {
        self.pin_store_path
            .clone()
            .or_else(|| config_dir().map(|d| d.join("known_peers.json")))
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config() -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            config = load_config_file(&global_path)?;
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Per-platform `SealChat` configuration directory.
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".sealchat"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/sealchat"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("sealchat"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("settings.json"))
}

/// Read a config file.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply `SEALCHAT_*` overrides read through `lookup`.
fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("SEALCHAT_USER_ID") {
        config.user_id = Some(val);
    }
    if let Some(val) = lookup("SEALCHAT_IDENTITY_DIR") {
        config.identity_dir = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("SEALCHAT_PIN_STORE") {
        config.pin_store_path = Some(PathBuf::from(val));
    }
    if let Some(flag) = lookup("SEALCHAT_STRICT_KEY_PINNING").as_deref().and_then(parse_bool) {
        config.strict_key_pinning = flag;
    }
    if let Some(val) = lookup("SEALCHAT_LOG_LEVEL") {
        config.log_level = val;
    }
    if let Some(flag) = lookup("SEALCHAT_LOG_JSON").as_deref().and_then(parse_bool) {
        config.log_json = flag;
    }
}
