use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::app::{GleanerError, Result};
use crate::domain::Fields;
use crate::store::{merge_records, CacheKind, RecordMap, Store};

/// In-memory view of one (site, keyword) cache file.
///
/// Loaded once at the start of an invocation, mutated in memory and
/// written back in a single `flush`.
#[derive(Debug, Clone)]
pub struct KeywordCache {
    kind: CacheKind,
    site: String,
    keyword: String,
    records: RecordMap,
}

impl KeywordCache {
    pub fn empty(kind: CacheKind, site: &str, keyword: &str) -> Self {
        Self {
            kind,
            site: site.to_string(),
            keyword: keyword.to_string(),
            records: RecordMap::new(),
        }
    }

    /// Load the cache, treating a missing file as empty.
    pub fn load(store: &dyn Store, kind: CacheKind, site: &str, keyword: &str) -> Result<Self> {
        let mut cache = Self::empty(kind, site, keyword);
        if let Some(records) = store.load(kind, site, keyword)? {
            cache.records = records;
        }
        Ok(cache)
    }

    /// Load the link cache for an inspection, which needs a prior search.
    pub fn load_links_required(store: &dyn Store, site: &str, keyword: &str) -> Result<Self> {
        match store.load(CacheKind::Links, site, keyword)? {
            Some(records) => Ok(Self {
                kind: CacheKind::Links,
                site: site.to_string(),
                keyword: keyword.to_string(),
                records,
            }),
            None => Err(GleanerError::NoCachedLinks {
                site: site.to_string(),
                keyword: keyword.to_string(),
            }),
        }
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.records.contains_key(url)
    }

    pub fn get(&self, url: &str) -> Option<&Fields> {
        self.records.get(url)
    }

    pub fn records(&self) -> &RecordMap {
        &self.records
    }

    /// Typed view of one entry; fields the type does not know are kept in
    /// its flattened extras.
    pub fn get_as<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        self.records
            .get(url)
            .map(|fields| serde_json::from_value(serde_json::Value::Object(fields.clone())))
            .transpose()
            .map_err(GleanerError::from)
    }

    pub fn merge(&mut self, updates: RecordMap) {
        merge_records(&mut self.records, updates, self.kind.identity_fields());
    }

    /// Serialize typed records and merge them in.
    pub fn merge_typed<'a, T, I>(&mut self, records: I) -> Result<()>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = (&'a String, &'a T)>,
    {
        let mut updates = RecordMap::new();
        for (url, record) in records {
            updates.insert(url.clone(), to_fields(record)?);
        }
        self.merge(updates);
        Ok(())
    }

    pub fn remove(&mut self, url: &str) -> Option<Fields> {
        self.records.remove(url)
    }

    pub fn flush(&self, store: &dyn Store) -> Result<()> {
        store.flush(self.kind, &self.site, &self.keyword, &self.records)?;
        info!(
            "Saved {} {} for '{}' on {}",
            self.records.len(),
            self.kind,
            self.keyword,
            self.site
        );
        Ok(())
    }
}

/// Serialize a typed record into a field map.
pub fn to_fields<T: Serialize>(record: &T) -> Result<Fields> {
    match serde_json::to_value(record)? {
        serde_json::Value::Object(fields) => Ok(fields),
        other => Err(GleanerError::Other(format!(
            "Record serialized to a non-object value: {}",
            other
        ))),
    }
}
