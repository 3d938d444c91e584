use std::fmt;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::app::Result;
use crate::scraper::adapter::{LinkMap, SiteAdapter};
use crate::scraper::retry::RetryPolicy;
use crate::scraper::session::BrowserSession;

/// Links discovered on one results page.
#[derive(Debug, Clone)]
pub struct LinkBatch {
    /// 1-based results page number.
    pub page_index: u32,
    pub links: LinkMap,
}

/// Why a search stopped producing batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The site offered no next-page control.
    NoNextPage,
    /// The configured page cap was reached.
    PageCap,
    /// Probing for or clicking the next-page control kept failing.
    NextPageFailed(String),
    /// The rendered results page could not be read.
    PageUnreadable(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoNextPage => f.write_str("no next page"),
            Self::PageCap => f.write_str("page cap reached"),
            Self::NextPageFailed(e) => write!(f, "next page failed: {}", e),
            Self::PageUnreadable(e) => write!(f, "results page unreadable: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SearchState {
    Submitting,
    PageLoaded(u32),
    Advancing(u32),
    Done(StopReason),
}

/// Drives a site's search flow one results page at a time.
///
/// Each call to [`next_batch`](Self::next_batch) moves the browser forward;
/// the sequence cannot be replayed.
pub struct SearchPaginator<'a> {
    session: &'a dyn BrowserSession,
    adapter: &'a dyn SiteAdapter,
    retry: RetryPolicy,
    keyword: String,
    max_pages: Option<u32>,
    state: SearchState,
}

impl<'a> SearchPaginator<'a> {
    pub fn new(
        session: &'a dyn BrowserSession,
        adapter: &'a dyn SiteAdapter,
        retry: RetryPolicy,
        keyword: &str,
        max_pages: Option<u32>,
    ) -> Self {
        let state = match max_pages {
            Some(0) => SearchState::Done(StopReason::PageCap),
            _ => SearchState::Submitting,
        };
        Self {
            session,
            adapter,
            retry,
            keyword: keyword.to_string(),
            max_pages,
            state,
        }
    }

    /// Why the search ended, once it has.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        match &self.state {
            SearchState::Done(reason) => Some(reason),
            _ => None,
        }
    }

    /// Produce the next batch, or `None` once the search is exhausted.
    ///
    /// A results page that cannot be read or a failing next-page control
    /// ends the search normally; only failures to submit the search or
    /// session-level failures are returned as errors.
    pub async fn next_batch(&mut self) -> Result<Option<LinkBatch>> {
        loop {
            match self.state.clone() {
                SearchState::Submitting => {
                    info!(site = self.adapter.name(), keyword = %self.keyword, "Submitting search");
                    self.adapter
                        .input_search_params(self.session, &self.keyword, &self.retry)
                        .await?;
                    self.state = SearchState::PageLoaded(1);
                }
                SearchState::PageLoaded(page) => match self.read_page(page).await {
                    Ok(batch) => {
                        self.state = SearchState::Advancing(page);
                        return Ok(Some(batch));
                    }
                    Err(e) if e.is_session_fatal() => return Err(e),
                    Err(e) => {
                        warn!("Stopping search at page {}: {}", page, e);
                        self.state = SearchState::Done(StopReason::PageUnreadable(e.to_string()));
                    }
                },
                SearchState::Advancing(page) => {
                    self.state = self.advance(page).await?;
                }
                SearchState::Done(_) => return Ok(None),
            }
        }
    }

    async fn read_page(&self, page: u32) -> Result<LinkBatch> {
        let session = self.session;
        let doc = self
            .retry
            .run("read results", move || session.current_document())
            .await?;
        let discovered = self.adapter.discover_links(&doc, &self.keyword);
        let now = Utc::now();

        let mut links = LinkMap::new();
        for (raw_url, mut record) in discovered {
            let source = if record.url.is_empty() {
                raw_url.as_str()
            } else {
                record.url.as_str()
            };
            let Some(url) = self.adapter.normalize_url(source) else {
                debug!("Dropping card with unusable url {:?}", source);
                continue;
            };
            record.url = url.clone();
            record.tag(&self.keyword, page, now);
            links.entry(url).or_insert(record);
        }

        info!(
            site = self.adapter.name(),
            page,
            links = links.len(),
            "Results page read"
        );
        Ok(LinkBatch {
            page_index: page,
            links,
        })
    }

    async fn advance(&self, page: u32) -> Result<SearchState> {
        if self.max_pages.is_some_and(|cap| page >= cap) {
            debug!("Page cap {} reached", page);
            return Ok(SearchState::Done(StopReason::PageCap));
        }

        match self.click_next().await {
            Ok(true) => Ok(SearchState::PageLoaded(page + 1)),
            Ok(false) => {
                debug!("No next-page control after page {}", page);
                Ok(SearchState::Done(StopReason::NoNextPage))
            }
            Err(e) if e.is_session_fatal() => Err(e),
            Err(e) => {
                warn!("Stopping search after page {}: {}", page, e);
                Ok(SearchState::Done(StopReason::NextPageFailed(e.to_string())))
            }
        }
    }

    /// Probe for the next-page control and click it; `false` when absent.
    async fn click_next(&self) -> Result<bool> {
        let selector = self.adapter.next_page_selector();
        let session = self.session;

        let present = self
            .retry
            .run("probe next page", move || session.is_present(selector))
            .await?;
        if !present {
            return Ok(false);
        }
        self.retry
            .run("next page", move || session.click_if_present(selector))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::GleanerError;
    use crate::scraper::testing::{
        quick_retry, ScriptState, ScriptedAdapter, ScriptedSession, NEXT_PAGE, SEARCH_INPUT,
    };

    fn pages(n: usize) -> Vec<String> {
        (1..=n)
            .map(|p| {
                format!(
                    "https://shop.example/p/{p}a|Item {p}a\nhttps://shop.example/p/{p}b|Item {p}b"
                )
            })
            .collect()
    }

    async fn drain(paginator: &mut SearchPaginator<'_>) -> Vec<LinkBatch> {
        let mut batches = Vec::new();
        while let Some(batch) = paginator.next_batch().await.unwrap() {
            batches.push(batch);
        }
        batches
    }

    #[tokio::test]
    async fn test_page_cap_stops_with_next_control_present() {
        let session = ScriptedSession::new(ScriptState {
            result_pages: pages(1),
            next_always_present: true,
            ..Default::default()
        });
        let adapter = ScriptedAdapter;
        let mut paginator = SearchPaginator::new(&session, &adapter, quick_retry(), "tv", Some(2));

        let batches = drain(&mut paginator).await;

        assert_eq!(batches.len(), 2);
        assert_eq!(paginator.stop_reason(), Some(&StopReason::PageCap));
        assert_eq!(session.count_calls(&format!("click {NEXT_PAGE}")), 1);
    }

    #[tokio::test]
    async fn test_stops_when_next_control_absent() {
        let session = ScriptedSession::new(ScriptState {
            result_pages: pages(3),
            ..Default::default()
        });
        let adapter = ScriptedAdapter;
        let mut paginator = SearchPaginator::new(&session, &adapter, quick_retry(), "tv", None);

        let batches = drain(&mut paginator).await;

        assert_eq!(batches.len(), 3);
        assert_eq!(
            batches.iter().map(|b| b.page_index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(paginator.stop_reason(), Some(&StopReason::NoNextPage));
        assert_eq!(session.count_calls(&format!("submit {SEARCH_INPUT} tv")), 1);
    }

    #[tokio::test]
    async fn test_links_are_tagged_and_canonical() {
        let session = ScriptedSession::new(ScriptState {
            result_pages: vec!["/p/1?utm_source=x|Relative\nhttps://shop.example/p/1#top|Dup".into()],
            ..Default::default()
        });
        let adapter = ScriptedAdapter;
        let mut paginator = SearchPaginator::new(&session, &adapter, quick_retry(), "tv", None);

        let batch = paginator.next_batch().await.unwrap().unwrap();

        assert_eq!(batch.links.len(), 1);
        let (url, record) = batch.links.iter().next().unwrap();
        assert_eq!(url, "https://shop.example/p/1");
        assert_eq!(record.url, *url);
        assert_eq!(record.keyword, "tv");
        assert_eq!(record.search_page_index, Some(1));
        assert!(record.discovered_at.is_some());
    }

    #[tokio::test]
    async fn test_flaky_next_click_is_retried() {
        let session = ScriptedSession::new(ScriptState {
            result_pages: pages(2),
            failing_clicks: 2,
            ..Default::default()
        });
        let adapter = ScriptedAdapter;
        let mut paginator = SearchPaginator::new(&session, &adapter, quick_retry(), "tv", None);

        let batches = drain(&mut paginator).await;

        assert_eq!(batches.len(), 2);
        assert_eq!(session.count_calls(&format!("click {NEXT_PAGE}")), 3);
    }

    #[tokio::test]
    async fn test_exhausted_next_click_ends_search_without_error() {
        let session = ScriptedSession::new(ScriptState {
            result_pages: pages(3),
            failing_clicks: 10,
            ..Default::default()
        });
        let adapter = ScriptedAdapter;
        let mut paginator = SearchPaginator::new(&session, &adapter, quick_retry(), "tv", None);

        let batches = drain(&mut paginator).await;

        assert_eq!(batches.len(), 1);
        assert!(matches!(
            paginator.stop_reason(),
            Some(StopReason::NextPageFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_flaky_next_probe_is_retried() {
        let session = ScriptedSession::new(ScriptState {
            result_pages: pages(2),
            failing_probes: 1,
            ..Default::default()
        });
        let adapter = ScriptedAdapter;
        let mut paginator = SearchPaginator::new(&session, &adapter, quick_retry(), "tv", None);

        let batches = drain(&mut paginator).await;

        assert_eq!(batches.len(), 2);
        assert_eq!(paginator.stop_reason(), Some(&StopReason::NoNextPage));
    }

    #[tokio::test]
    async fn test_exhausted_next_probe_ends_search_without_error() {
        let session = ScriptedSession::new(ScriptState {
            result_pages: pages(3),
            failing_probes: 10,
            ..Default::default()
        });
        let adapter = ScriptedAdapter;
        let mut paginator = SearchPaginator::new(&session, &adapter, quick_retry(), "tv", None);

        let batches = drain(&mut paginator).await;

        assert_eq!(batches.len(), 1);
        assert!(matches!(
            paginator.stop_reason(),
            Some(StopReason::NextPageFailed(_))
        ));
        assert_eq!(session.count_calls(&format!("click {NEXT_PAGE}")), 0);
    }

    #[tokio::test]
    async fn test_unreadable_page_ends_search_without_error() {
        let session = ScriptedSession::new(ScriptState {
            result_pages: pages(3),
            failing_reads: 10,
            ..Default::default()
        });
        let adapter = ScriptedAdapter;
        let mut paginator = SearchPaginator::new(&session, &adapter, quick_retry(), "tv", None);

        let batches = drain(&mut paginator).await;

        assert!(batches.is_empty());
        assert!(matches!(
            paginator.stop_reason(),
            Some(StopReason::PageUnreadable(_))
        ));
    }

    #[tokio::test]
    async fn test_flaky_page_read_is_retried() {
        let session = ScriptedSession::new(ScriptState {
            result_pages: pages(1),
            failing_reads: 2,
            ..Default::default()
        });
        let adapter = ScriptedAdapter;
        let mut paginator = SearchPaginator::new(&session, &adapter, quick_retry(), "tv", None);

        let batches = drain(&mut paginator).await;

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].links.len(), 2);
    }

    #[tokio::test]
    async fn test_lost_session_while_advancing_is_an_error() {
        let session = ScriptedSession::new(ScriptState {
            result_pages: pages(3),
            fatal_clicks: true,
            ..Default::default()
        });
        let adapter = ScriptedAdapter;
        let mut paginator = SearchPaginator::new(&session, &adapter, quick_retry(), "tv", None);

        assert!(paginator.next_batch().await.unwrap().is_some());
        let err = paginator.next_batch().await.unwrap_err();

        assert!(matches!(err, GleanerError::SessionLost(_)));
        assert_eq!(session.count_calls(&format!("click {NEXT_PAGE}")), 1);
    }

    #[tokio::test]
    async fn test_slow_site_open_is_retried() {
        let session = ScriptedSession::new(ScriptState {
            result_pages: pages(1),
            failing_navigations: 1,
            ..Default::default()
        });
        let adapter = ScriptedAdapter;
        let mut paginator = SearchPaginator::new(&session, &adapter, quick_retry(), "tv", None);

        let batches = drain(&mut paginator).await;

        assert_eq!(batches.len(), 1);
        assert_eq!(session.count_calls("navigate https://shop.example"), 2);
    }

    #[tokio::test]
    async fn test_zero_page_cap_never_touches_browser() {
        let session = ScriptedSession::default();
        let adapter = ScriptedAdapter;
        let mut paginator = SearchPaginator::new(&session, &adapter, quick_retry(), "tv", Some(0));

        assert!(paginator.next_batch().await.unwrap().is_none());
        assert!(session.calls().is_empty());
    }
}
