use std::collections::BTreeMap;

use async_trait::async_trait;
use url::Url;

use crate::app::Result;
use crate::domain::{LinkRecord, PageRecord};
use crate::scraper::retry::RetryPolicy;
use crate::scraper::session::{BrowserSession, Document};

/// Links discovered on one results page, keyed by canonical URL.
pub type LinkMap = BTreeMap<String, LinkRecord>;

/// Query parameters that only carry tracking data.
const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "ref", "ref_", "srsltid", "spm"];

/// Query parameters that wrap the real destination of a redirect link.
const REDIRECT_PARAMS: &[&str] = &["url", "u", "redirect", "target"];

/// Per-site capabilities the scraping engine drives.
///
/// The engine never branches on which site it is talking to; everything
/// site-specific lives behind this trait.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn base_url(&self) -> &str;

    fn search_input_selector(&self) -> &str;

    fn next_page_selector(&self) -> &str;

    /// Product cards on a results page. Cards missing required fields are
    /// left out of the map.
    fn discover_links(&self, doc: &Document, keyword: &str) -> LinkMap;

    /// Extract the detail record of the page the session is showing.
    ///
    /// A record without a category is treated as incomplete by the engine.
    async fn extract_detail(
        &self,
        session: &dyn BrowserSession,
        retry: &RetryPolicy,
    ) -> Result<PageRecord>;

    /// Open the site and submit `keyword` into its search input.
    ///
    /// Override for multi-step flows such as category pre-selection or
    /// dismissing onboarding dialogs.
    async fn input_search_params(
        &self,
        session: &dyn BrowserSession,
        keyword: &str,
        retry: &RetryPolicy,
    ) -> Result<()> {
        let base = self.base_url();
        retry.run("open site", move || session.navigate(base)).await?;
        let selector = self.search_input_selector();
        retry
            .run("submit search", move || {
                session.type_and_submit(selector, keyword)
            })
            .await
    }

    /// Canonical form of a product URL; duplicates must collapse to one key.
    fn normalize_url(&self, url: &str) -> Option<String> {
        canonicalize_url(self.base_url(), url)
    }
}

/// Resolve `raw` against `base`, unwrap redirect wrappers and strip
/// fragments and tracking parameters.
pub fn canonicalize_url(base: &str, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut url = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base).ok()?.join(raw).ok()?,
        Err(_) => return None,
    };

    if let Some(target) = redirect_target(&url) {
        url = target;
    }

    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    Some(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

fn redirect_target(url: &Url) -> Option<Url> {
    url.query_pairs()
        .filter(|(key, _)| REDIRECT_PARAMS.contains(&key.as_ref()))
        .find_map(|(_, value)| {
            Url::parse(&value)
                .ok()
                .filter(|target| matches!(target.scheme(), "http" | "https"))
        })
}
