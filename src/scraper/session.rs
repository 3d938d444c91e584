use async_trait::async_trait;

use crate::app::Result;
use crate::scraper::config::SessionConfig;

/// Snapshot of the rendered page at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub url: String,
    pub html: String,
}

impl Document {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// Parse the snapshot for selector queries.
    ///
    /// The parsed tree is not `Send`; keep it out of `.await` points.
    pub fn parse(&self) -> scraper::Html {
        scraper::Html::parse_document(&self.html)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.html.contains(needle)
    }
}

/// Captured page artifact and the file extension matching its encoding.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// One automated browser instance driving a single tab.
///
/// Methods take `&self` so retried interactions can be expressed as plain
/// closures over a shared reference.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Focus the element, type `text` and press Enter.
    async fn type_and_submit(&self, selector: &str, text: &str) -> Result<()>;

    /// Click the first element matching `selector`; `false` when none exists.
    async fn click_if_present(&self, selector: &str) -> Result<bool>;

    async fn is_present(&self, selector: &str) -> Result<bool>;

    async fn current_document(&self) -> Result<Document>;

    /// Full-page capture as a paginated document where the backend allows it.
    async fn capture_artifact(&self) -> Result<Artifact>;

    /// Release the browser. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Starts browser sessions; fails with `SessionInit` when the backend is
/// unavailable.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn BrowserSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_parse_and_contains() {
        let doc = Document::new(
            "https://shop.example/s?q=tv",
            "<html><body><div class=\"card\">TV</div></body></html>",
        );
        assert!(doc.contains("card"));
        let html = doc.parse();
        let selector = scraper::Selector::parse("div.card").unwrap();
        assert_eq!(html.select(&selector).count(), 1);
    }
}
