use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::app::{GleanerError, Result};
use crate::store::{slug, CacheKind, RecordMap, Store};

/// Cache store backed by one pretty-printed JSON object per file.
///
/// Layout under `root`:
///
/// ```text
/// <site>/<keyword>.links.json
/// <site>/<keyword>.pages.json
/// <screenshots_dir>/<artifact>
/// ```
pub struct JsonStore {
    root: PathBuf,
    screenshots_dir: PathBuf,
}

impl JsonStore {
    pub fn new<P: AsRef<Path>>(root: P, screenshots_dir: &str) -> Self {
        let root = root.as_ref().to_path_buf();
        let screenshots_dir = root.join(screenshots_dir);
        Self {
            root,
            screenshots_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn screenshots_dir(&self) -> &Path {
        &self.screenshots_dir
    }

    fn parse(path: &Path, content: &str) -> Result<RecordMap> {
        let value: Value = serde_json::from_str(content)?;
        let Value::Object(entries) = value else {
            return Err(GleanerError::Other(format!(
                "Cache file {} does not hold a JSON object",
                path.display()
            )));
        };

        let mut records = RecordMap::new();
        for (url, value) in entries {
            match value {
                Value::Object(mut fields) => {
                    fields
                        .entry("url")
                        .or_insert_with(|| Value::String(url.clone()));
                    records.insert(url, fields);
                }
                other => {
                    warn!(
                        "Skipping non-object entry for {} in {}: {}",
                        url,
                        path.display(),
                        other
                    );
                }
            }
        }
        Ok(records)
    }

    /// Write-to-temp, sync, then rename over the target.
    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl Store for JsonStore {
    fn load(&self, kind: CacheKind, site: &str, keyword: &str) -> Result<Option<RecordMap>> {
        let path = self.cache_path(kind, site, keyword);
        if !path.exists() {
            debug!("No {} cache at {}", kind, path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let records = Self::parse(&path, &content)?;
        debug!("Loaded {} {} from {}", records.len(), kind, path.display());
        Ok(Some(records))
    }

    fn flush(
        &self,
        kind: CacheKind,
        site: &str,
        keyword: &str,
        records: &RecordMap,
    ) -> Result<()> {
        let path = self.cache_path(kind, site, keyword);
        let json = serde_json::to_string_pretty(records)?;
        Self::write_atomic(&path, json.as_bytes())?;
        debug!("Flushed {} {} to {}", records.len(), kind, path.display());
        Ok(())
    }

    fn save_artifact(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.screenshots_dir.join(file_name);
        Self::write_atomic(&path, bytes)?;
        Ok(path)
    }

    fn cache_path(&self, kind: CacheKind, site: &str, keyword: &str) -> PathBuf {
        self.root
            .join(slug(site))
            .join(format!("{}.{}", slug(keyword), kind.file_suffix()))
    }
}
