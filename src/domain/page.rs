use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::certificate;
use crate::domain::Fields;

/// Separator used when a category path is stored as a single string.
pub const CATEGORY_SEPARATOR: &str = "|";

/// Full structured record extracted from a product detail page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRecord {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Breadcrumb path joined with [`CATEGORY_SEPARATOR`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub characteristics: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_number: Option<String>,
    /// Product code or EAN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// File name of the captured artifact, relative to the screenshots folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub keyword: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<DateTime<Utc>>,
    /// Link fields and adapter-specific fields without a typed slot.
    #[serde(flatten)]
    pub extra: Fields,
}

impl PageRecord {
    /// Fields where the first value wins on merge; everything else is
    /// refreshed by the latest extraction.
    pub const IDENTITY_FIELDS: &'static [&'static str] = &["url"];

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Category presence is the structural validity check for a detail page.
    pub fn is_complete(&self) -> bool {
        self.category
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }

    pub fn category_path(&self) -> Vec<&str> {
        self.category
            .as_deref()
            .map(|c| {
                c.split(CATEGORY_SEPARATOR)
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_category_path<S: AsRef<str>>(&mut self, parts: &[S]) {
        let joined = parts
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(CATEGORY_SEPARATOR);
        self.category = (!joined.is_empty()).then_some(joined);
    }

    /// Recompute the certificate number so it is either 12 digits or absent.
    ///
    /// A value set by the adapter is normalized first; otherwise the
    /// characteristics table is searched.
    pub fn resolve_certificate(&mut self) {
        self.certificate_number = self
            .certificate_number
            .as_deref()
            .and_then(certificate::normalize)
            .or_else(|| certificate::extract(&self.characteristics));
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}
