use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::{GleanerError, Result};
use crate::scraper::config::SessionConfig;
use crate::scraper::retry::RetryPolicy;
use crate::scraper::session::{Artifact, BrowserSession, Document, SessionLauncher};

/// Hides the most common automation fingerprints from page scripts.
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'languages', { get: () => ['pt-BR', 'pt', 'en-US', 'en'] });
    window.chrome = window.chrome || { runtime: {} };
"#;

/// Launches Chrome/Chromium through chromiumoxide.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeLauncher;

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn BrowserSession>> {
        let retry = RetryPolicy::new(config.reconnect_attempts, config.wait_after_load());
        let session = retry
            .run("launch browser", || ChromeSession::launch(config.clone()))
            .await
            .map_err(|e| match e {
                GleanerError::InteractionFailed { cause, attempts } => GleanerError::SessionInit(
                    format!("{} (after {} attempts)", cause, attempts),
                ),
                other => other,
            })?;
        Ok(Box::new(session))
    }
}

/// A single Chrome tab owned end to end by one scrape invocation.
pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
    config: SessionConfig,
    navigated: AtomicBool,
}

impl ChromeSession {
    /// Launch a browser and open a blank tab with stealth measures applied.
    pub async fn launch(config: SessionConfig) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(config.timeout())
            .window_size(config.window_width, config.window_height)
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-notifications")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        if !config.headless {
            builder = builder.with_head();
        }

        if let Some(ref path) = config.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder.build().map_err(|e| {
            GleanerError::SessionInit(format!("Failed to build browser config: {}", e))
        })?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            GleanerError::Browser(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {:?}", e);
                }
            }
            debug!("Browser event handler finished");
        });

        let page = match Self::prepare_page(&browser, &config).await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(e);
            }
        };

        info!(headless = config.headless, "Browser session opened");

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler,
            config,
            navigated: AtomicBool::new(false),
        })
    }

    async fn prepare_page(browser: &Browser, config: &SessionConfig) -> Result<Page> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| GleanerError::SessionInit(format!("Failed to create page: {}", e)))?;

        if let Some(ref ua) = config.user_agent {
            page.set_user_agent(ua)
                .await
                .map_err(|e| GleanerError::SessionInit(format!("Failed to set user agent: {}", e)))?;
        }

        if let Err(e) = page.evaluate_on_new_document(STEALTH_SCRIPT).await {
            warn!("Stealth script injection failed: {}", e);
        }

        Ok(page)
    }

    async fn settle(&self) {
        tokio::time::sleep(self.config.wait_after_load()).await;
    }

    /// Best-effort pass over an anti-bot interstitial. Never fails.
    async fn try_bypass_challenge(&self) {
        let html = match self.page.content().await {
            Ok(html) => html,
            Err(e) => {
                debug!("Challenge check skipped: {}", e);
                return;
            }
        };

        let Some(marker) = self
            .config
            .challenge_markers
            .iter()
            .find(|marker| html.contains(marker.as_str()))
        else {
            return;
        };

        info!(marker = %marker, "Anti-bot challenge detected, attempting bypass");
        tokio::time::sleep(self.config.challenge_wait()).await;

        for selector in &self.config.challenge_selectors {
            match self.click_if_present(selector).await {
                Ok(true) => {
                    debug!("Clicked challenge control {}", selector);
                    tokio::time::sleep(self.config.challenge_wait()).await;
                    return;
                }
                Ok(false) => {}
                Err(e) => debug!("Challenge control {} failed: {}", selector, e),
            }
        }
        debug!("No challenge control found; continuing");
    }
}

/// Map a chromiumoxide failure onto the session/item split.
fn classify(context: &str, error: impl std::fmt::Display) -> GleanerError {
    let message = format!("{}: {}", context, error);
    let lowered = message.to_lowercase();
    if lowered.contains("websocket")
        || lowered.contains("channel")
        || lowered.contains("browser closed")
        || lowered.contains("target closed")
        || lowered.contains("no response from the chromium instance")
    {
        GleanerError::SessionLost(message)
    } else {
        GleanerError::Browser(message)
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        match tokio::time::timeout(self.config.timeout(), self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(classify(&format!("Navigation to {} failed", url), e)),
            Err(_) => {
                return Err(GleanerError::Browser(format!(
                    "Navigation to {} timed out after {:?}",
                    url,
                    self.config.timeout()
                )))
            }
        }
        self.settle().await;

        if self.config.bypass_challenge && !self.navigated.swap(true, Ordering::SeqCst) {
            self.try_bypass_challenge().await;
        }
        Ok(())
    }

    async fn type_and_submit(&self, selector: &str, text: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| classify(&format!("Search input {} not found", selector), e))?;

        element
            .click()
            .await
            .map_err(|e| classify("Failed to focus search input", e))?;
        element
            .type_str(text)
            .await
            .map_err(|e| classify("Failed to type search term", e))?;
        element
            .press_key("Enter")
            .await
            .map_err(|e| classify("Failed to submit search", e))?;

        // Some sites submit in place without a navigation event.
        if tokio::time::timeout(self.config.timeout(), self.page.wait_for_navigation())
            .await
            .is_err()
        {
            debug!("No navigation after submitting search; continuing");
        }
        self.settle().await;
        Ok(())
    }

    async fn click_if_present(&self, selector: &str) -> Result<bool> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| classify(&format!("Lookup of {} failed", selector), e))?;

        let Some(element) = elements.into_iter().next() else {
            return Ok(false);
        };

        element
            .scroll_into_view()
            .await
            .map_err(|e| classify(&format!("Failed to scroll to {}", selector), e))?;
        element
            .click()
            .await
            .map_err(|e| classify(&format!("Failed to click {}", selector), e))?;

        self.settle().await;
        Ok(true)
    }

    async fn is_present(&self, selector: &str) -> Result<bool> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| classify(&format!("Lookup of {} failed", selector), e))?;
        Ok(!elements.is_empty())
    }

    async fn current_document(&self) -> Result<Document> {
        let html = self
            .page
            .content()
            .await
            .map_err(|e| classify("Failed to read page content", e))?;
        let url = self
            .page
            .url()
            .await
            .map_err(|e| classify("Failed to read page url", e))?
            .unwrap_or_default();
        Ok(Document { url, html })
    }

    async fn capture_artifact(&self) -> Result<Artifact> {
        let params = PrintToPdfParams {
            print_background: Some(true),
            ..Default::default()
        };
        match self.page.pdf(params).await {
            Ok(bytes) => Ok(Artifact {
                bytes,
                extension: "pdf",
            }),
            Err(e) => {
                // printToPDF is only available headless.
                debug!("PDF capture unavailable, falling back to screenshot: {}", e);
                let bytes = self
                    .page
                    .screenshot(ScreenshotParams::builder().full_page(true).build())
                    .await
                    .map_err(|e| classify("Screenshot failed", e))?;
                Ok(Artifact {
                    bytes,
                    extension: "png",
                })
            }
        }
    }

    async fn close(&self) -> Result<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        self.handler.abort();
        info!("Browser session closed");
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        // Browser's own Drop kills the process; the handler must not outlive it.
        self.handler.abort();
    }
}

/// Chrome launcher as a shared trait object.
pub fn default_launcher() -> Arc<dyn SessionLauncher> {
    Arc::new(ChromeLauncher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_connection_errors_as_session_lost() {
        let err = classify("Navigation failed", "WebSocket protocol error: Connection reset");
        assert!(err.is_session_fatal());

        let err = classify("Click failed", "send failed because receiver is gone: channel closed");
        assert!(err.is_session_fatal());
    }

    #[test]
    fn test_classify_element_errors_as_item_failures() {
        let err = classify("Search input #q not found", "Could not find node with given id");
        assert!(!err.is_session_fatal());
        assert!(matches!(err, GleanerError::Browser(_)));
    }
}
