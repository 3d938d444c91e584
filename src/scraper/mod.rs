//! Browser-driven scraping engine.
//!
//! One [`BrowserSession`] drives one keyword end to end. The
//! [`SearchPaginator`] walks the search results of a [`SiteAdapter`] and
//! the [`PageInspector`] visits the discovered product pages.
//!
//! # Architecture
//!
//! ```text
//! keyword → SearchPaginator → link cache → PageInspector → page cache
//!                ↑                               ↑
//!                └──── SiteAdapter + BrowserSession ────┘
//! ```
//!
//! Flaky interactions (submitting the search, clicking the next page,
//! expanding accordions) go through a [`RetryPolicy`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use gleaner::scraper::{default_launcher, SearchPaginator, SessionConfig};
//!
//! let session = default_launcher().open(&SessionConfig::default()).await?;
//! let mut paginator = SearchPaginator::new(session.as_ref(), adapter, retry, "router", Some(3));
//! while let Some(batch) = paginator.next_batch().await? {
//!     println!("page {}: {} links", batch.page_index, batch.links.len());
//! }
//! session.close().await?;
//! ```

mod adapter;
mod chrome;
mod config;
mod inspector;
mod paginator;
mod retry;
mod session;
mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{canonicalize_url, LinkMap, SiteAdapter};
pub use chrome::{default_launcher, ChromeLauncher, ChromeSession};
pub use config::SessionConfig;
pub use inspector::{
    artifact_file_name, Candidate, InspectOptions, Inspection, InspectionPlan, PageInspector,
    SkipReason,
};
pub use paginator::{LinkBatch, SearchPaginator, StopReason};
pub use retry::RetryPolicy;
pub use session::{Artifact, BrowserSession, Document, SessionLauncher};
pub use stream::{RunSummary, ScrapeStream, SkippedItem};

pub(crate) use stream::CacheGuard;
