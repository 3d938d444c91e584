//! Configuration for gleaner.
//!
//! Configuration is read from `~/.config/gleaner/config.toml` at startup,
//! or from the path given with `--config`. If the default file doesn't
//! exist, a commented default is created.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::adapters::SiteConfig;
use crate::app::{GleanerError, Result};
use crate::fetcher::FetcherConfig;
use crate::scraper::{RetryPolicy, SessionConfig};

/// Where caches and artifacts live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Defaults to `<data dir>/gleaner`.
    pub root: Option<PathBuf>,
    /// Artifact folder, relative to the root.
    pub screenshots_dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            screenshots_dir: "screenshots".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn root_dir(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("gleaner"))
                .ok_or_else(|| GleanerError::Config("Could not find data directory".into())),
        }
    }
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub fetcher: FetcherConfig,
    pub sites: Vec<SiteConfig>,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> std::result::Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/gleaner/config.toml`
    pub fn default_config_path() -> std::result::Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("gleaner").join("config.toml"))
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> std::result::Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> &'static str {
        r##"# gleaner configuration

[session]
# Run the browser without a visible window
headless = true

# Navigation timeout in seconds
timeout_secs = 30

# Wait after each navigation or click for dynamic content (milliseconds)
wait_after_load_ms = 1500

# Reconnect attempts when the browser fails to start
reconnect_attempts = 3

# Try to get past an anti-bot interstitial after the first navigation
bypass_challenge = true
challenge_wait_ms = 5000

# Path to a Chrome/Chromium binary; autodetected when unset
# chrome_executable = "/usr/bin/chromium"

[retry]
# Attempts for flaky interactions (search submit, next page, expanders)
max_attempts = 3
# Fixed pause between attempts (milliseconds)
backoff_ms = 1000

[cache]
# Folder holding <site>/<keyword>.links.json and .pages.json
# root = "/home/me/gleaner"
screenshots_dir = "screenshots"

[fetcher]
# Parallel plain HTTP fetches for `gleaner fetch-text`
workers = 10
timeout_secs = 15

# One [[sites]] block per shop. All selectors are CSS.
#
# [[sites]]
# name = "example-shop"
# base_url = "https://shop.example"
# search_input = "input[name=q]"
# next_page = "a.pagination-next"
# pre_search_clicks = ["button#accept-cookies"]
#
# [sites.card]
# container = "li.product-card"
# link = "a.product-link"
# title = "h2.product-title"
# price = ".price"
# rating = ".rating"
# review_count = ".reviews"
# image = "img"
#
# [sites.detail]
# name = "h1"
# breadcrumb = "nav.breadcrumb a"
# price = ".price-current"
# brand = ".brand"
# seller = ".seller-name"
# seller_link = "a.seller-name"
# description = "#description"
# images = ".gallery img"
# spec_row = "table.specs tr"
# spec_key = "th"
# spec_value = "td"
# expand = ["button.show-specs"]
"##
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl From<ConfigError> for GleanerError {
    fn from(err: ConfigError) -> Self {
        GleanerError::Config(err.to_string())
    }
}
