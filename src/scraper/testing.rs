//! Scripted browser, launcher and adapter used by the engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::app::{GleanerError, Result};
use crate::domain::{LinkRecord, PageRecord};
use crate::scraper::adapter::{LinkMap, SiteAdapter};
use crate::scraper::config::SessionConfig;
use crate::scraper::retry::RetryPolicy;
use crate::scraper::session::{Artifact, BrowserSession, Document, SessionLauncher};

pub const SEARCH_INPUT: &str = "#search";
pub const NEXT_PAGE: &str = "a.next";

#[derive(Debug, Default)]
pub struct ScriptState {
    /// Result pages served in order after the search is submitted.
    pub result_pages: Vec<String>,
    /// Keep offering a next-page control past the last result page.
    pub next_always_present: bool,
    /// Detail pages by URL.
    pub details: HashMap<String, String>,
    /// Next-page clicks that fail before one succeeds.
    pub failing_clicks: u32,
    /// Next-page probes that fail before one succeeds.
    pub failing_probes: u32,
    /// Document reads that fail before one succeeds.
    pub failing_reads: u32,
    /// Next-page clicks kill the session.
    pub fatal_clicks: bool,
    /// Navigations that time out before one succeeds.
    pub failing_navigations: u32,
    /// URLs whose navigation fails with an item-level error.
    pub broken_urls: HashSet<String>,
    /// URLs whose navigation kills the session.
    pub fatal_urls: HashSet<String>,
    pub current: Document,
    pub result_index: Option<usize>,
    pub calls: Vec<String>,
    pub close_count: u32,
}

#[derive(Clone, Default)]
pub struct ScriptedSession {
    pub state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSession {
    pub fn new(state: ScriptState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn close_count(&self) -> u32 {
        self.state.lock().unwrap().close_count
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("navigate {url}"));
        if state.fatal_urls.contains(url) {
            return Err(GleanerError::SessionLost("browser crashed".into()));
        }
        if state.failing_navigations > 0 {
            state.failing_navigations -= 1;
            return Err(GleanerError::Browser(format!("net::ERR_TIMED_OUT at {url}")));
        }
        if state.broken_urls.contains(url) {
            return Err(GleanerError::Browser(format!("net::ERR_TIMED_OUT at {url}")));
        }
        let html = state.details.get(url).cloned().unwrap_or_default();
        state.current = Document::new(url, html);
        Ok(())
    }

    async fn type_and_submit(&self, selector: &str, text: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("submit {selector} {text}"));
        state.result_index = Some(0);
        let html = state.result_pages.first().cloned().unwrap_or_default();
        state.current = Document::new("https://shop.example/search?page=1", html);
        Ok(())
    }

    async fn click_if_present(&self, selector: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("click {selector}"));
        if selector != NEXT_PAGE {
            return Ok(false);
        }
        if state.fatal_clicks {
            return Err(GleanerError::SessionLost("browser crashed".into()));
        }
        if state.failing_clicks > 0 {
            state.failing_clicks -= 1;
            return Err(GleanerError::Browser("next button covered by overlay".into()));
        }
        let Some(index) = state.result_index else {
            return Ok(false);
        };
        let next = index + 1;
        if next >= state.result_pages.len() && !state.next_always_present {
            return Ok(false);
        }
        state.result_index = Some(next);
        let html = state
            .result_pages
            .get(next)
            .or(state.result_pages.last())
            .cloned()
            .unwrap_or_default();
        state.current = Document::new(format!("https://shop.example/search?page={}", next + 1), html);
        Ok(true)
    }

    async fn is_present(&self, selector: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("probe {selector}"));
        if selector != NEXT_PAGE {
            return Ok(false);
        }
        if state.failing_probes > 0 {
            state.failing_probes -= 1;
            return Err(GleanerError::Browser("Could not find node".into()));
        }
        Ok(match state.result_index {
            Some(index) => state.next_always_present || index + 1 < state.result_pages.len(),
            None => false,
        })
    }

    async fn current_document(&self) -> Result<Document> {
        let mut state = self.state.lock().unwrap();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(GleanerError::Browser("execution context destroyed".into()));
        }
        Ok(state.current.clone())
    }

    async fn capture_artifact(&self) -> Result<Artifact> {
        let state = self.state.lock().unwrap();
        Ok(Artifact {
            bytes: format!("%PDF {}", state.current.url).into_bytes(),
            extension: "pdf",
        })
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().close_count += 1;
        Ok(())
    }
}

/// Hands out clones of one scripted session, or refuses to start.
pub struct ScriptedLauncher {
    pub session: ScriptedSession,
    pub fail: bool,
    pub opened: Mutex<u32>,
}

impl ScriptedLauncher {
    pub fn new(session: ScriptedSession) -> Self {
        Self {
            session,
            fail: false,
            opened: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(ScriptedSession::default())
        }
    }

    pub fn opened(&self) -> u32 {
        *self.opened.lock().unwrap()
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    async fn open(&self, _config: &SessionConfig) -> Result<Box<dyn BrowserSession>> {
        if self.fail {
            return Err(GleanerError::SessionInit("chrome not found".into()));
        }
        *self.opened.lock().unwrap() += 1;
        Ok(Box::new(self.session.clone()))
    }
}

/// Adapter over the scripted pages.
///
/// Result pages list one product URL per line, optionally followed by
/// `|title`. Detail pages are JSON page records.
pub struct ScriptedAdapter;

#[async_trait]
impl SiteAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    fn base_url(&self) -> &str {
        "https://shop.example"
    }

    fn search_input_selector(&self) -> &str {
        SEARCH_INPUT
    }

    fn next_page_selector(&self) -> &str {
        NEXT_PAGE
    }

    fn discover_links(&self, doc: &Document, _keyword: &str) -> LinkMap {
        doc.html
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let (url, title) = line.split_once('|').unwrap_or((line, "Product"));
                let record = LinkRecord {
                    title: Some(title.to_string()),
                    ..LinkRecord::new(url)
                };
                (url.to_string(), record)
            })
            .collect()
    }

    async fn extract_detail(
        &self,
        session: &dyn BrowserSession,
        _retry: &RetryPolicy,
    ) -> Result<PageRecord> {
        let doc = session.current_document().await?;
        if doc.html.is_empty() {
            return Ok(PageRecord::new(doc.url));
        }
        serde_json::from_str(&doc.html)
            .map_err(|e| GleanerError::Browser(format!("Unexpected detail layout: {e}")))
    }
}

pub fn quick_retry() -> RetryPolicy {
    RetryPolicy::new(3, std::time::Duration::from_millis(1))
}
