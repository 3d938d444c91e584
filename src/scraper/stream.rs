use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::app::{GleanerError, Result};
use crate::scraper::inspector::SkipReason;
use crate::scraper::paginator::StopReason;
use crate::store::{KeywordCache, Store};

/// An item the run left out, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedItem {
    pub url: String,
    pub reason: SkipReason,
}

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Items delivered on the stream.
    pub emitted: usize,
    pub skipped: Vec<SkippedItem>,
    /// Links removed from the link cache because their page was incomplete.
    pub evicted: Vec<String>,
    /// Set for searches.
    pub stop_reason: Option<StopReason>,
    /// Entries in the primary cache after the flush.
    pub cache_size: usize,
}

impl RunSummary {
    pub fn skip(&mut self, url: impl Into<String>, reason: SkipReason) {
        self.skipped.push(SkippedItem {
            url: url.into(),
            reason,
        });
    }
}

/// Progress stream of one scrape invocation.
///
/// Items arrive as the browser produces them. The sequence cannot be
/// replayed; dropping the stream stops the run, and the caches are still
/// flushed by the background task.
pub struct ScrapeStream<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<Result<RunSummary>>,
}

impl<T> ScrapeStream<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>, task: JoinHandle<Result<RunSummary>>) -> Self {
        Self { rx, task }
    }

    /// Next item, or `None` once the run has ended.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stop consuming and wait for the run to flush its caches.
    ///
    /// Session-level failures surface here, after the flush.
    pub async fn finish(self) -> Result<RunSummary> {
        let Self { rx, task } = self;
        drop(rx);
        task.await
            .map_err(|e| GleanerError::Other(format!("Scrape task failed: {}", e)))?
    }

    /// Drain every item, then finish.
    pub async fn collect_all(mut self) -> Result<(Vec<T>, RunSummary)> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item);
        }
        let summary = self.finish().await?;
        Ok((items, summary))
    }
}

impl<T> Stream for ScrapeStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Caches owned by a running invocation.
///
/// `flush` is the normal exit. If the owning task unwinds or is aborted
/// first, `Drop` writes whatever was accumulated.
pub(crate) struct CacheGuard {
    store: Arc<dyn Store>,
    pub links: KeywordCache,
    pub pages: Option<KeywordCache>,
    flushed: bool,
}

impl CacheGuard {
    pub fn new(store: Arc<dyn Store>, links: KeywordCache, pages: Option<KeywordCache>) -> Self {
        Self {
            store,
            links,
            pages,
            flushed: false,
        }
    }

    pub fn flush(mut self) -> Result<()> {
        self.flushed = true;
        self.write_all()
    }

    fn write_all(&self) -> Result<()> {
        // Both files are attempted even if the first write fails.
        let links = self.links.flush(self.store.as_ref());
        let pages = match &self.pages {
            Some(pages) => pages.flush(self.store.as_ref()),
            None => Ok(()),
        };
        links.and(pages)
    }
}

impl Drop for CacheGuard {
    fn drop(&mut self) {
        if self.flushed {
            return;
        }
        if let Err(e) = self.write_all() {
            error!("Failed to save caches for '{}': {}", self.links.keyword(), e);
        }
    }
}
