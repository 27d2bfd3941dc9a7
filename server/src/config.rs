use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use finchat_core::config::{get_default_config_file, ChatConfig};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "finchat";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub http_addr: SocketAddr,
    /// Idle minutes before a conversation is dropped
    pub session_ttl_minutes: i64,
    pub cleanup_interval_secs: u64,
    pub chat: ChatConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8501)),
            session_ttl_minutes: 60,
            cleanup_interval_secs: 60,
            chat: ChatConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file; a missing file yields the defaults
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Loads `~/.config/finchat/config.toml`, or the defaults when it is absent
    pub fn load_from_default() -> Result<Self> {
        Self::load_from_file(&Self::default_path()?)
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(get_default_config_file(APP_NAME)?)
    }

    /// Layer the provider settings: defaults, then this file, then the
    /// environment, then command-line flags.
    pub fn effective_chat(&self, env: &ChatConfig, cli: &ChatConfig) -> ChatConfig {
        ChatConfig::default()
            .merge(&self.chat)
            .merge(env)
            .merge(cli)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_ttl_minutes.max(1))
    }
}
