use thiserror::Error;

#[derive(Error, Debug)]
pub enum GleanerError {
    #[error("Browser session could not start: {0}")]
    SessionInit(String),

    #[error("Browser session lost: {0}")]
    SessionLost(String),

    #[error("Browser interaction failed: {0}")]
    Browser(String),

    #[error("Interaction failed after {attempts} attempts: {cause}")]
    InteractionFailed { cause: String, attempts: u32 },

    #[error("No cached links for '{keyword}' on {site}; run a search first")]
    NoCachedLinks { site: String, keyword: String },

    #[error("No cached pages for '{keyword}' on {site}; run an inspection first")]
    NoCachedPages { site: String, keyword: String },

    #[error("Unknown site: {0}")]
    UnknownSite(String),

    #[error("Invalid selector '{0}'")]
    Selector(String),

    #[error("Scorer error: {0}")]
    Scorer(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl GleanerError {
    /// Whether the error means the browser session itself is unusable.
    ///
    /// Everything else is scoped to the current item or step.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::SessionInit(_) | Self::SessionLost(_))
    }
}

pub type Result<T> = std::result::Result<T, GleanerError>;
