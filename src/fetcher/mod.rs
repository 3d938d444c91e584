//! Plain HTTP fetching of already discovered product URLs.
//!
//! Runs after a search, outside the browser session, through a bounded
//! worker pool. Each URL succeeds or fails on its own.

pub mod http_fetcher;
pub mod parallel;
pub mod plaintext;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::app::Result;

pub use http_fetcher::HttpFetcher;
pub use parallel::ParallelFetcher;
pub use plaintext::html_to_text;

pub const DEFAULT_WORKERS: usize = 10;

/// `[fetcher]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub workers: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            timeout_secs: 15,
            user_agent: concat!("gleaner/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a page body as text.
    async fn fetch(&self, url: &str) -> Result<String>;
}
