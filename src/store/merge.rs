use serde_json::Value;

use crate::domain::Fields;
use crate::store::RecordMap;

/// Shallow field merge of `update` onto `existing`.
///
/// Null values never erase data. Fields listed in `keep_first` keep
/// their current non-null value; every other field takes the update.
/// Fields only present in `existing` survive.
pub fn merge_fields(existing: &mut Fields, update: Fields, keep_first: &[&str]) {
    for (key, value) in update {
        if value.is_null() {
            continue;
        }
        let pinned = keep_first.contains(&key.as_str())
            && existing.get(&key).is_some_and(|current| !current.is_null());
        if !pinned {
            existing.insert(key, value);
        }
    }
}

/// Merge a batch of URL-keyed updates into an existing map.
///
/// Keys are never removed, so the result is a superset of both inputs.
/// The `url` field of every touched entry is set to its key.
pub fn merge_records(existing: &mut RecordMap, updates: RecordMap, keep_first: &[&str]) {
    for (url, update) in updates {
        let entry = existing.entry(url.clone()).or_default();
        merge_fields(entry, update, keep_first);
        entry.insert("url".to_string(), Value::String(url));
    }
}
