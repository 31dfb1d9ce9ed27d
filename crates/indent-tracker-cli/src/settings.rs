//! Environment-driven settings for the CLI.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use indent_tracker_assist::{AssistConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use indent_tracker_core::store::DEFAULT_NAMESPACE;
use indent_tracker_core::StoreConfig;

pub const ENV_DB: &str = "INDENT_TRACKER_DB";
pub const ENV_NAMESPACE: &str = "INDENT_TRACKER_NAMESPACE";
pub const ENV_POLL_MS: &str = "INDENT_TRACKER_POLL_MS";
pub const ENV_RETAINED_CHANGES: &str = "INDENT_TRACKER_RETAINED_CHANGES";
pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_MODEL: &str = "GEMINI_MODEL";
pub const ENV_BASE_URL: &str = "GEMINI_BASE_URL";

/// Database file used when neither `--db` nor `INDENT_TRACKER_DB` is given.
pub const DEFAULT_DB_FILE: &str = "indent-tracker.db";

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub namespace: String,
    pub poll_interval: Duration,
    pub retained_changes: u32,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Settings {
    /// Read settings from the environment; flags passed on the command line win.
    pub fn from_env(db: Option<PathBuf>, namespace: Option<String>) -> Result<Self> {
        let poll_interval = match non_empty(ENV_POLL_MS) {
            Some(raw) => {
                let ms: u64 = raw
                    .parse()
                    .with_context(|| format!("{ENV_POLL_MS} must be a number of milliseconds, got '{raw}'"))?;
                Duration::from_millis(ms.max(1))
            }
            None => StoreConfig::default().poll_interval,
        };
        let retained_changes = match non_empty(ENV_RETAINED_CHANGES) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("{ENV_RETAINED_CHANGES} must be a row count, got '{raw}'"))?,
            None => StoreConfig::default().retained_changes,
        };

        Ok(Self {
            db_path: db
                .or_else(|| non_empty(ENV_DB).map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE)),
            namespace: namespace
                .or_else(|| non_empty(ENV_NAMESPACE))
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            poll_interval,
            retained_changes,
            api_key: non_empty(ENV_API_KEY),
            model: non_empty(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: non_empty(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: Some(self.db_path.clone()),
            namespace: self.namespace.clone(),
            poll_interval: self.poll_interval,
            retained_changes: self.retained_changes,
        }
    }

    /// Assist settings; the API key is mandatory here and only here.
    pub fn assist_config(&self) -> Result<AssistConfig> {
        let api_key = self
            .api_key
            .clone()
            .with_context(|| format!("{ENV_API_KEY} is not set (export it or add it to .env.local)"))?;
        let mut config = AssistConfig::new(api_key);
        config.model = self.model.clone();
        config.base_url = self.base_url.clone();
        Ok(config)
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
