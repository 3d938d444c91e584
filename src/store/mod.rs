pub mod cache;
pub mod json;
pub mod merge;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::app::Result;
use crate::domain::Fields;

pub use cache::KeywordCache;
pub use json::JsonStore;
pub use merge::{merge_fields, merge_records};

/// URL-keyed record map, the in-memory form of one cache file.
pub type RecordMap = BTreeMap<String, Fields>;

/// Which of the two per-keyword caches a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Links,
    Pages,
}

impl CacheKind {
    pub fn file_suffix(self) -> &'static str {
        match self {
            Self::Links => "links.json",
            Self::Pages => "pages.json",
        }
    }

    /// Fields that keep their first non-null value when merged.
    pub fn identity_fields(self) -> &'static [&'static str] {
        match self {
            Self::Links => crate::domain::LinkRecord::IDENTITY_FIELDS,
            Self::Pages => crate::domain::PageRecord::IDENTITY_FIELDS,
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Links => f.write_str("links"),
            Self::Pages => f.write_str("pages"),
        }
    }
}

/// Persistence for per-(site, keyword) caches and captured artifacts.
///
/// The unit of durability is a whole cache file: `flush` replaces it
/// atomically and there are no per-key writes.
pub trait Store: Send + Sync {
    /// Load a cache file; `None` when it has never been written.
    fn load(&self, kind: CacheKind, site: &str, keyword: &str) -> Result<Option<RecordMap>>;

    fn flush(&self, kind: CacheKind, site: &str, keyword: &str, records: &RecordMap)
        -> Result<()>;

    /// Store an artifact under the screenshots folder and return its path.
    fn save_artifact(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf>;

    fn cache_path(&self, kind: CacheKind, site: &str, keyword: &str) -> PathBuf;
}

/// Deterministic file-name form of a keyword or site name.
///
/// Lowercased and trimmed, with every run of non-alphanumeric characters
/// collapsed to a single underscore.
pub fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_sep = false;

    for c in value.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }

    if out.is_empty() {
        out.push('_');
    }
    out
}
