use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::app::Result;
use crate::fetcher::{Fetcher, FetcherConfig};

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;

        let body = response.text().await?;
        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_from_default_config() {
        assert!(HttpFetcher::new(&FetcherConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_is_an_error() {
        let fetcher = HttpFetcher::new(&FetcherConfig::default()).unwrap();
        assert!(fetcher.fetch("not a url").await.is_err());
    }
}
