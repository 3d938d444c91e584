//! Per-invocation composition of session, adapter and caches.
//!
//! Every run owns its caches for its whole lifetime and writes them back
//! exactly once, whichever way the run ends.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::adapters::AdapterRegistry;
use crate::app::{GleanerError, Result};
use crate::config::Config;
use crate::domain::{Fields, PageRecord};
use crate::fetcher::{Fetcher, FetcherConfig, HttpFetcher, ParallelFetcher};
use crate::scoring::{RecordScorer, ScoreTable};
use crate::scraper::{
    BrowserSession, CacheGuard, Candidate, InspectOptions, Inspection, InspectionPlan, LinkBatch,
    PageInspector, RetryPolicy, RunSummary, ScrapeStream, SearchPaginator, SessionConfig,
    SessionLauncher, SiteAdapter, SkipReason,
};
use crate::store::{CacheKind, KeywordCache, RecordMap, Store};

/// Knobs for one `search` invocation.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Stop after this many results pages; `None` follows the site to the end.
    pub max_pages: Option<u32>,
    /// Start from an empty link cache instead of merging into the old one.
    pub overwrite: bool,
}

/// What a spawned run needs, detached from the orchestrator's lifetime.
#[derive(Clone)]
struct RunContext {
    launcher: Arc<dyn SessionLauncher>,
    store: Arc<dyn Store>,
    session: SessionConfig,
    retry: RetryPolicy,
}

impl RunContext {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>> {
        info!(headless = self.session.headless, "Opening browser session");
        self.launcher.open(&self.session).await
    }
}

async fn close_session(session: Box<dyn BrowserSession>) {
    if let Err(e) = session.close().await {
        warn!("Browser did not close cleanly: {}", e);
    }
}

pub struct ScrapeOrchestrator {
    registry: AdapterRegistry,
    fetcher: FetcherConfig,
    ctx: RunContext,
}

impl ScrapeOrchestrator {
    pub fn new(
        config: &Config,
        launcher: Arc<dyn SessionLauncher>,
        store: Arc<dyn Store>,
    ) -> Result<Self> {
        Ok(Self {
            registry: AdapterRegistry::from_sites(&config.sites)?,
            fetcher: config.fetcher.clone(),
            ctx: RunContext {
                launcher,
                store,
                session: config.session.clone(),
                retry: config.retry,
            },
        })
    }

    /// Add a hand-written adapter next to the configured ones.
    pub fn register(&mut self, adapter: Arc<dyn SiteAdapter>) -> Result<()> {
        self.registry.register(adapter)
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn Store {
        self.ctx.store.as_ref()
    }

    /// Load one cache of a site, treating a missing file as empty.
    pub fn cache(&self, kind: CacheKind, site: &str, keyword: &str) -> Result<KeywordCache> {
        let adapter = self.registry.get(site)?;
        KeywordCache::load(self.store(), kind, adapter.name(), keyword)
    }

    /// Paginate the site's search results for `keyword`.
    ///
    /// Batches are merged into the link cache as they are produced and the
    /// cache is flushed when the run ends, also when the stream is dropped
    /// early or the browser dies.
    ///
    /// # Panics
    ///
    /// The run is spawned on the current Tokio runtime; calling this
    /// outside one panics.
    pub fn search(
        &self,
        site: &str,
        keyword: &str,
        options: SearchOptions,
    ) -> Result<ScrapeStream<LinkBatch>> {
        let keyword = clean_keyword(keyword)?;
        let adapter = self.registry.get(site)?;
        let links = if options.overwrite {
            KeywordCache::empty(CacheKind::Links, adapter.name(), &keyword)
        } else {
            KeywordCache::load(self.store(), CacheKind::Links, adapter.name(), &keyword)?
        };

        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(run_search(self.ctx.clone(), adapter, links, options, tx));
        Ok(ScrapeStream::new(rx, task))
    }

    /// Visit cached links of `keyword` and stream the completed page records.
    ///
    /// Fails up front with `NoCachedLinks` when the keyword was never
    /// searched. The browser is only opened when there is something to visit.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime, like [`search`](Self::search).
    pub fn inspect_pages(
        &self,
        site: &str,
        keyword: &str,
        options: InspectOptions,
    ) -> Result<ScrapeStream<PageRecord>> {
        let keyword = clean_keyword(keyword)?;
        let adapter = self.registry.get(site)?;
        let links = KeywordCache::load_links_required(self.store(), adapter.name(), &keyword)?;
        let pages = KeywordCache::load(self.store(), CacheKind::Pages, adapter.name(), &keyword)?;

        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(run_inspection(
            self.ctx.clone(),
            adapter,
            links,
            pages,
            options,
            tx,
        ));
        Ok(ScrapeStream::new(rx, task))
    }

    /// Fetch a plain-text rendering of every cached link over HTTP.
    pub async fn fetch_plaintext(
        &self,
        site: &str,
        keyword: &str,
        refresh: bool,
    ) -> Result<RunSummary> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&self.fetcher)?);
        self.fetch_plaintext_with(site, keyword, fetcher, refresh).await
    }

    /// Like [`fetch_plaintext`](Self::fetch_plaintext) with a caller-chosen fetcher.
    ///
    /// Links that already carry `plain_text` are skipped unless `refresh`.
    pub async fn fetch_plaintext_with(
        &self,
        site: &str,
        keyword: &str,
        fetcher: Arc<dyn Fetcher>,
        refresh: bool,
    ) -> Result<RunSummary> {
        let keyword = clean_keyword(keyword)?;
        let adapter = self.registry.get(site)?;
        let links = KeywordCache::load_links_required(self.store(), adapter.name(), &keyword)?;

        let urls: Vec<String> = links
            .records()
            .iter()
            .filter(|(_, fields)| refresh || !fields.contains_key(PLAIN_TEXT))
            .map(|(url, _)| url.clone())
            .collect();
        info!("Fetching plain text for {} of {} links", urls.len(), links.len());

        let mut guard = CacheGuard::new(self.ctx.store.clone(), links, None);
        let pool = ParallelFetcher::with_workers(fetcher, self.fetcher.workers);
        let mut summary = RunSummary::default();
        let mut updates = RecordMap::new();

        for (url, result) in pool.fetch_all(urls).await {
            match result {
                Ok(text) => {
                    let mut fields = Fields::new();
                    fields.insert(PLAIN_TEXT.to_string(), Value::String(text));
                    updates.insert(url, fields);
                    summary.emitted += 1;
                }
                Err(e) => summary.skip(url, SkipReason::FetchFailed(e.to_string())),
            }
        }

        guard.links.merge(updates);
        summary.cache_size = guard.links.len();
        guard.flush()?;
        Ok(summary)
    }

    /// Hand the page cache of `keyword` to an external scorer.
    pub async fn score(
        &self,
        site: &str,
        keyword: &str,
        scorer: &dyn RecordScorer,
    ) -> Result<ScoreTable> {
        let keyword = clean_keyword(keyword)?;
        let adapter = self.registry.get(site)?;
        let site = adapter.name();

        let Some(pages) = self.store().load(CacheKind::Pages, site, &keyword)? else {
            return Err(GleanerError::NoCachedPages {
                site: site.to_string(),
                keyword,
            });
        };

        let path = self.store().cache_path(CacheKind::Pages, site, &keyword);
        let table = scorer.score(&path).await?;

        let unknown: Vec<&String> = table.keys().filter(|url| !pages.contains_key(*url)).collect();
        if !unknown.is_empty() {
            warn!(
                "Scorer returned {} rows for URLs not in the page cache, first: {}",
                unknown.len(),
                unknown[0]
            );
        }
        let unscored = pages.keys().filter(|url| !table.contains_key(*url)).count();
        if unscored > 0 {
            debug!("{} cached pages have no score", unscored);
        }

        Ok(table)
    }
}

/// Link field holding the HTTP plain-text rendering.
pub const PLAIN_TEXT: &str = "plain_text";

fn clean_keyword(keyword: &str) -> Result<String> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Err(GleanerError::Other("keyword must not be empty".into()));
    }
    Ok(keyword.to_string())
}

/// Flush the run's caches, then report the run outcome.
///
/// A run error wins over a flush error; the flush error is only logged then.
fn finish_run(
    guard: CacheGuard,
    outcome: Result<RunSummary>,
    cache_size: usize,
) -> Result<RunSummary> {
    let flushed = guard.flush();
    match outcome {
        Ok(mut summary) => {
            flushed?;
            summary.cache_size = cache_size;
            Ok(summary)
        }
        Err(e) => {
            if let Err(flush_error) = flushed {
                error!("Caches not saved after failed run: {}", flush_error);
            }
            error!("Run aborted: {}", e);
            Err(e)
        }
    }
}

async fn run_search(
    ctx: RunContext,
    adapter: Arc<dyn SiteAdapter>,
    links: KeywordCache,
    options: SearchOptions,
    tx: mpsc::Sender<LinkBatch>,
) -> Result<RunSummary> {
    let keyword = links.keyword().to_string();
    let mut guard = CacheGuard::new(ctx.store.clone(), links, None);

    let outcome = if options.max_pages == Some(0) {
        Ok(RunSummary::default())
    } else {
        let max_pages = options.max_pages;
        search_into(&ctx, adapter.as_ref(), &keyword, max_pages, &mut guard.links, &tx).await
    };

    let size = guard.links.len();
    finish_run(guard, outcome, size)
}

async fn search_into(
    ctx: &RunContext,
    adapter: &dyn SiteAdapter,
    keyword: &str,
    max_pages: Option<u32>,
    links: &mut KeywordCache,
    tx: &mpsc::Sender<LinkBatch>,
) -> Result<RunSummary> {
    let session = ctx.open_session().await?;
    let mut paginator =
        SearchPaginator::new(session.as_ref(), adapter, ctx.retry, keyword, max_pages);
    let mut summary = RunSummary::default();

    let result = paginate(&mut paginator, links, tx, &mut summary).await;
    summary.stop_reason = paginator.stop_reason().cloned();

    drop(paginator);
    close_session(session).await;
    result.map(|()| summary)
}

async fn paginate(
    paginator: &mut SearchPaginator<'_>,
    links: &mut KeywordCache,
    tx: &mpsc::Sender<LinkBatch>,
    summary: &mut RunSummary,
) -> Result<()> {
    while let Some(batch) = paginator.next_batch().await? {
        links.merge_typed(&batch.links)?;
        summary.emitted += 1;
        if tx.send(batch).await.is_err() {
            info!("Search stream dropped; stopping");
            break;
        }
    }
    Ok(())
}

async fn run_inspection(
    ctx: RunContext,
    adapter: Arc<dyn SiteAdapter>,
    links: KeywordCache,
    pages: KeywordCache,
    options: InspectOptions,
    tx: mpsc::Sender<PageRecord>,
) -> Result<RunSummary> {
    let mut guard = CacheGuard::new(ctx.store.clone(), links, Some(pages));
    let outcome = inspect_into(&ctx, adapter.as_ref(), &options, &mut guard, &tx).await;
    let size = guard.pages.as_ref().map_or(0, KeywordCache::len);
    finish_run(guard, outcome, size)
}

async fn inspect_into(
    ctx: &RunContext,
    adapter: &dyn SiteAdapter,
    options: &InspectOptions,
    guard: &mut CacheGuard,
    tx: &mpsc::Sender<PageRecord>,
) -> Result<RunSummary> {
    let plan = InspectionPlan::build(&guard.links, guard.pages.as_ref(), options);
    let mut summary = RunSummary {
        skipped: plan.skipped,
        ..Default::default()
    };

    if plan.queue.is_empty() {
        info!("Nothing to inspect for '{}'", guard.links.keyword());
        return Ok(summary);
    }

    let session = ctx.open_session().await?;
    let keyword = guard.links.keyword().to_string();
    let inspector = PageInspector::new(
        session.as_ref(),
        adapter,
        ctx.store.as_ref(),
        ctx.retry,
        &keyword,
        options.capture_artifacts,
    );

    let result = visit(&inspector, plan.queue, guard, tx, &mut summary).await;

    drop(inspector);
    close_session(session).await;
    result.map(|()| summary)
}

async fn visit(
    inspector: &PageInspector<'_>,
    queue: Vec<Candidate>,
    guard: &mut CacheGuard,
    tx: &mpsc::Sender<PageRecord>,
    summary: &mut RunSummary,
) -> Result<()> {
    let total = queue.len();

    for candidate in queue {
        match inspector.inspect(&candidate).await? {
            Inspection::Complete(record) => {
                if let Some(pages) = guard.pages.as_mut() {
                    pages.merge_typed([(&record.url, &record)])?;
                }
                summary.emitted += 1;
                info!("[{}/{}] {}", candidate.index + 1, total, record.display_name());
                if tx.send(record).await.is_err() {
                    info!("Inspection stream dropped; stopping");
                    break;
                }
            }
            Inspection::Skipped(reason) => {
                if reason == SkipReason::IncompleteRecord {
                    guard.links.remove(&candidate.url);
                    if let Some(pages) = guard.pages.as_mut() {
                        pages.remove(&candidate.url);
                    }
                    summary.evicted.push(candidate.url.clone());
                }
                debug!("Skipped {}: {}", candidate.url, reason);
                summary.skip(candidate.url, reason);
            }
        }
    }

    Ok(())
}
