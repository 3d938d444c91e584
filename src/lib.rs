//! # Gleaner
//!
//! Harvests structured product records from e-commerce sites for a search
//! keyword, driving a real browser through each site's search and product
//! pages.
//!
//! ## Architecture
//!
//! ```text
//! keyword → SearchPaginator → link cache → PageInspector → page cache → scorer
//! ```
//!
//! Both caches are JSON files keyed by product URL, one pair per
//! (site, keyword). Runs merge into them and write them back once, so an
//! interrupted run resumes where it stopped.
//!
//! ## Quick Start
//!
//! ```bash
//! # Discover product links for a keyword
//! gleaner search example-shop "roteador wifi" --max-pages 3
//!
//! # Visit 20 of them and extract product records
//! gleaner inspect example-shop "roteador wifi" --sample 20 --shuffle
//!
//! # Hand the records to an external scorer
//! gleaner score example-shop "roteador wifi" --command "python3 score.py"
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the store and
/// the orchestrator from a loaded config.
pub mod app;

/// Site adapters built from `[[sites]]` selector sets.
pub mod adapters;

/// Command-line interface using clap.
///
/// - `sites` - List configured sites
/// - `search <site> <keyword>` - Cache product links
/// - `inspect <site> <keyword>` - Extract product pages
/// - `fetch-text <site> <keyword>` - Plain HTTP text of cached links
/// - `score <site> <keyword>` - Run an external scorer
/// - `show <site> <keyword>` - Summarize a cache file
pub mod cli;

/// Configuration loaded from `~/.config/gleaner/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`LinkRecord`](domain::LinkRecord): Product card from a results page
/// - [`PageRecord`](domain::PageRecord): Full product detail record
pub mod domain;

/// Plain HTTP fetching with a bounded worker pool.
pub mod fetcher;

/// Search and inspection runs with guaranteed cache flushes.
pub mod orchestrator;

/// External record scorer boundary.
pub mod scoring;

/// Browser-driven scraping engine.
///
/// Uses Chrome via chromiumoxide. The engine only talks to the
/// [`BrowserSession`](scraper::BrowserSession) and
/// [`SiteAdapter`](scraper::SiteAdapter) traits.
pub mod scraper;

/// JSON cache files and artifacts.
///
/// - [`Store`](store::Store): Trait defining persistence operations
/// - [`JsonStore`](store::JsonStore): One JSON file per (site, keyword, kind)
pub mod store;
