//! Feed configuration
//!
//! Loaded from `~/.threadline/config.toml` when present. Every field has a
//! default, so a partial file (or none at all) is fine:
//!
//! ```toml
//! page_size = 20
//! strict_comment_refs = true
//!
//! [http]
//! base_url = "https://parish.example/api"
//!
//! [http.retry]
//! max_retries = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::constants;
use crate::source::retry::RetryConfig;

/// Settings for one comment feed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Top-level comments per page
    pub page_size: u32,
    /// Replies per page in an expanded thread
    pub reply_page_size: u32,
    /// Delay between the highlighted node appearing and the scroll
    pub settle_delay_ms: u64,
    /// Renders without the highlighted node before giving up on it
    pub max_observations: u32,
    /// Re-fetches of a colliding page before the scope is marked failed
    pub max_page_refetches: u32,
    /// Reject comment links that resolve to a reply instead of following the parent
    pub strict_comment_refs: bool,
    /// Seconds a notice stays visible
    pub notice_ttl_secs: u64,
    pub http: HttpConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: constants::feed::PAGE_SIZE,
            reply_page_size: constants::feed::REPLY_PAGE_SIZE,
            settle_delay_ms: constants::feed::SETTLE_DELAY.as_millis() as u64,
            max_observations: constants::feed::MAX_OBSERVATIONS,
            max_page_refetches: constants::feed::MAX_PAGE_REFETCHES,
            strict_comment_refs: false,
            notice_ttl_secs: constants::feed::NOTICE_TTL.as_secs(),
            http: HttpConfig::default(),
        }
    }
}

impl FeedConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(constants::config::CONFIG_DIR_NAME)
            .join(constants::config::CONFIG_FILE_NAME)
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("invalid feed config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            anyhow::bail!("page_size must be at least 1");
        }
        if self.reply_page_size == 0 {
            anyhow::bail!("reply_page_size must be at least 1");
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_secs(self.notice_ttl_secs)
    }
}

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: constants::http::DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: constants::http::CONNECT_TIMEOUT.as_secs(),
            request_timeout_secs: constants::http::REQUEST_TIMEOUT.as_secs(),
            retry: RetrySettings::default(),
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Retry policy as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            jitter: defaults.jitter,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}
