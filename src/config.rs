use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

pub const DEFAULT_FEED_URL: &str = "https://walksoftly.itsaninja.party/newcomics.php";

/// Timestamp layout used for `pull_refresh`.
pub const REFRESH_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_minutes: u32,

    /// Last time a pull-list sync completed, in `REFRESH_FORMAT`.
    #[serde(default)]
    pub pull_refresh: Option<String>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pullsync");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("pullsync.db").to_string_lossy().to_string()
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_user_agent() -> String {
    format!("pullsync/{} (stable)", env!("CARGO_PKG_VERSION"))
}

fn default_refresh_interval() -> u32 {
    360
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            feed_url: default_feed_url(),
            user_agent: default_user_agent(),
            refresh_interval_minutes: default_refresh_interval(),
            pull_refresh: None,
        }
    }
}

impl Config {
    /// Reads the config at `path`, writing out defaults when the file is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pullsync")
            .join("config.toml")
    }
}
