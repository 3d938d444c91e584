pub mod certificate;
pub mod link;
pub mod page;

pub use link::LinkRecord;
pub use page::{PageRecord, CATEGORY_SEPARATOR};

/// Loosely typed record body as stored in the cache files.
pub type Fields = serde_json::Map<String, serde_json::Value>;
