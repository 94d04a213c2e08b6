//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which covers the API base endpoint, the request timeout, and the last
//! used username.
//!
//! Configuration is stored at `~/.config/kbterm/config.json`. The endpoint
//! and timeout are deploy-time settings: the `KBTERM_API_URL` and
//! `KBTERM_TIMEOUT_SECS` environment variables (usually supplied through a
//! `.env` file) override whatever the config file says.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "kbterm";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default request timeout in seconds.
/// Deployments fronting slow retrieval pipelines raise this to 240.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default API base endpoint (a local service instance).
const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/ai";

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };

        // Deploy-time overrides
        if let Ok(url) = std::env::var("KBTERM_API_URL") {
            config.api_url = url;
        }
        if let Ok(secs) = std::env::var("KBTERM_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.timeout_secs = secs;
            }
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted session file.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
