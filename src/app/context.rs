use std::sync::Arc;

use crate::app::error::Result;
use crate::config::Config;
use crate::orchestrator::ScrapeOrchestrator;
use crate::scraper::{default_launcher, SessionLauncher};
use crate::store::JsonStore;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<JsonStore>,
    pub orchestrator: ScrapeOrchestrator,
}

impl AppContext {
    /// Wire the JSON store and a Chrome launcher from the loaded config.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_launcher(config, default_launcher())
    }

    pub fn with_launcher(config: Config, launcher: Arc<dyn SessionLauncher>) -> Result<Self> {
        let root = config.cache.root_dir()?;
        std::fs::create_dir_all(&root)?;

        let store = Arc::new(JsonStore::new(&root, &config.cache.screenshots_dir));
        let orchestrator = ScrapeOrchestrator::new(&config, launcher, store.clone())?;

        Ok(Self {
            config,
            store,
            orchestrator,
        })
    }
}
