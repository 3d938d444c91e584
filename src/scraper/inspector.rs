use std::fmt;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::app::Result;
use crate::domain::{Fields, PageRecord};
use crate::scraper::adapter::SiteAdapter;
use crate::scraper::retry::RetryPolicy;
use crate::scraper::session::BrowserSession;
use crate::scraper::stream::SkippedItem;
use crate::store::cache::to_fields;
use crate::store::{merge_fields, slug, KeywordCache, Store};

/// Knobs for one `inspect_pages` invocation.
#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    /// Maximum number of pages visited; `None` visits all.
    pub sample_size: Option<usize>,
    pub shuffle: bool,
    pub capture_artifacts: bool,
    /// Visit links that already have a complete page record.
    pub revisit: bool,
    /// Fixed seed for reproducible shuffles.
    pub seed: Option<u64>,
}

/// Why a link produced no page record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The detail page had no category; the link is evicted.
    IncompleteRecord,
    NavigationFailed(String),
    ExtractionFailed(String),
    /// A complete record from an earlier run exists.
    AlreadyInspected,
    /// Plain HTTP fetch of the page failed.
    FetchFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompleteRecord => f.write_str("incomplete record"),
            Self::NavigationFailed(e) => write!(f, "navigation failed: {}", e),
            Self::ExtractionFailed(e) => write!(f, "extraction failed: {}", e),
            Self::AlreadyInspected => f.write_str("already inspected"),
            Self::FetchFailed(e) => write!(f, "fetch failed: {}", e),
        }
    }
}

/// Outcome of visiting one link.
#[derive(Debug, Clone)]
pub enum Inspection {
    Complete(PageRecord),
    Skipped(SkipReason),
}

/// A link queued for a visit.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub url: String,
    /// Position in this run's traversal.
    pub index: usize,
    /// Cached link fields, merged under the extracted record.
    pub link: Fields,
}

/// Traversal order for one run, decided before the browser opens.
#[derive(Debug, Default)]
pub struct InspectionPlan {
    pub queue: Vec<Candidate>,
    pub skipped: Vec<SkippedItem>,
}

impl InspectionPlan {
    /// Order the cached links oldest discovery first, optionally shuffle,
    /// drop already inspected ones and cut to the sample size.
    pub fn build(
        links: &KeywordCache,
        pages: Option<&KeywordCache>,
        options: &InspectOptions,
    ) -> Self {
        let mut entries: Vec<(&String, &Fields)> = links.records().iter().collect();
        entries.sort_by(|a, b| {
            discovered_at(a.1)
                .cmp(&discovered_at(b.1))
                .then_with(|| a.0.cmp(b.0))
        });

        if options.shuffle {
            let mut rng = match options.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_rng(&mut rand::rng()),
            };
            entries.shuffle(&mut rng);
        }

        let mut plan = Self::default();
        let cap = options.sample_size.unwrap_or(usize::MAX);

        for (url, fields) in entries {
            if plan.queue.len() >= cap {
                break;
            }
            if !options.revisit && pages.is_some_and(|p| has_category(p.get(url))) {
                plan.skipped.push(SkippedItem {
                    url: url.clone(),
                    reason: SkipReason::AlreadyInspected,
                });
                continue;
            }
            plan.queue.push(Candidate {
                url: url.clone(),
                index: plan.queue.len(),
                link: fields.clone(),
            });
        }

        debug!(
            "Planned {} visits, {} already inspected",
            plan.queue.len(),
            plan.skipped.len()
        );
        plan
    }
}

fn discovered_at(fields: &Fields) -> Option<DateTime<Utc>> {
    fields
        .get("discovered_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn has_category(fields: Option<&Fields>) -> bool {
    fields
        .and_then(|f| f.get("category"))
        .and_then(Value::as_str)
        .is_some_and(|c| !c.trim().is_empty())
}

/// File name for a page artifact: site slug plus a short URL digest.
pub fn artifact_file_name(site: &str, url: &str, extension: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    format!("{}_{}.{}", slug(site), &digest[..16], extension)
}

/// Visits detail pages and turns them into page records.
pub struct PageInspector<'a> {
    session: &'a dyn BrowserSession,
    adapter: &'a dyn SiteAdapter,
    store: &'a dyn Store,
    retry: RetryPolicy,
    keyword: String,
    capture_artifacts: bool,
}

impl<'a> PageInspector<'a> {
    pub fn new(
        session: &'a dyn BrowserSession,
        adapter: &'a dyn SiteAdapter,
        store: &'a dyn Store,
        retry: RetryPolicy,
        keyword: &str,
        capture_artifacts: bool,
    ) -> Self {
        Self {
            session,
            adapter,
            store,
            retry,
            keyword: keyword.to_string(),
            capture_artifacts,
        }
    }

    /// Visit one candidate.
    ///
    /// Item-level failures come back as [`Inspection::Skipped`]; only
    /// session-level failures are errors.
    pub async fn inspect(&self, candidate: &Candidate) -> Result<Inspection> {
        let session = self.session;
        let url = candidate.url.as_str();

        if let Err(e) = self
            .retry
            .run("open detail page", move || session.navigate(url))
            .await
        {
            if e.is_session_fatal() {
                return Err(e);
            }
            warn!("Skipping {}: {}", url, e);
            return Ok(Inspection::Skipped(SkipReason::NavigationFailed(
                e.to_string(),
            )));
        }

        let mut record = match self.adapter.extract_detail(session, &self.retry).await {
            Ok(record) => record,
            Err(e) if e.is_session_fatal() => return Err(e),
            Err(e) => {
                warn!("Skipping {}: {}", url, e);
                return Ok(Inspection::Skipped(SkipReason::ExtractionFailed(
                    e.to_string(),
                )));
            }
        };

        if !record.is_complete() {
            info!("Dropping {}: no category on detail page", url);
            return Ok(Inspection::Skipped(SkipReason::IncompleteRecord));
        }

        record.url = candidate.url.clone();
        record.keyword = self.keyword.clone();
        record.sample_index = Some(candidate.index);
        record.extracted_at = Some(Utc::now());
        record.resolve_certificate();

        if self.capture_artifacts {
            match self.capture(url).await {
                Ok(name) => record.screenshot = Some(name),
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => warn!("No artifact for {}: {}", url, e),
            }
        }

        debug!("Extracted {}", record.display_name());
        Ok(Inspection::Complete(combine(&candidate.link, record)?))
    }

    async fn capture(&self, url: &str) -> Result<String> {
        let artifact = self.session.capture_artifact().await?;
        let name = artifact_file_name(self.adapter.name(), url, artifact.extension);
        self.store.save_artifact(&name, &artifact.bytes)?;
        Ok(name)
    }
}

/// Lay the extracted record over the cached link fields; detail wins.
fn combine(link: &Fields, record: PageRecord) -> Result<PageRecord> {
    let mut fields = link.clone();
    merge_fields(&mut fields, to_fields(&record)?, &[]);
    match serde_json::from_value(Value::Object(fields)) {
        Ok(combined) => Ok(combined),
        Err(e) => {
            debug!("Link fields for {} do not fit a page record: {}", record.url, e);
            Ok(record)
        }
    }
}
