use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Fields;

/// Lightweight product entry discovered on a search results page.
///
/// Keyed by its canonical `url` in the link cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkRecord {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_page_index: Option<u32>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub keyword: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovered_at: Option<DateTime<Utc>>,
    /// Adapter-specific fields carried through the cache untouched.
    #[serde(flatten)]
    pub extra: Fields,
}

impl LinkRecord {
    /// Fields where the first sighting wins on merge.
    pub const IDENTITY_FIELDS: &'static [&'static str] = &[
        "url",
        "title",
        "image_url",
        "keyword",
        "search_page_index",
        "discovered_at",
    ];

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }

    /// Tag the record with where and when it was first seen.
    pub fn tag(&mut self, keyword: &str, page_index: u32, now: DateTime<Utc>) {
        self.keyword = keyword.to_string();
        self.search_page_index = Some(page_index);
        self.discovered_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_land_in_extra() {
        let json = r#"{"url":"https://shop.example/p/1","title":"Router","sponsored":true}"#;
        let record: LinkRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.title.as_deref(), Some("Router"));
        assert_eq!(record.extra.get("sponsored"), Some(&serde_json::Value::Bool(true)));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["sponsored"], serde_json::Value::Bool(true));
        assert!(back.get("price").is_none());
    }

    #[test]
    fn test_tag_sets_discovery_fields() {
        let mut record = LinkRecord::new("https://shop.example/p/1");
        let now = Utc::now();
        record.tag("roteador wifi", 2, now);
        assert_eq!(record.keyword, "roteador wifi");
        assert_eq!(record.search_page_index, Some(2));
        assert_eq!(record.discovered_at, Some(now));
    }

    #[test]
    fn test_display_title_falls_back_to_url() {
        let record = LinkRecord::new("https://shop.example/p/1");
        assert_eq!(record.display_title(), "https://shop.example/p/1");
    }
}
