//! Site adapters and the registry the orchestrator picks them from.
//!
//! Every configured `[[sites]]` entry becomes a [`SelectorAdapter`].
//! Hand-written adapters can be registered alongside; the engine only
//! ever sees the [`SiteAdapter`] trait.

mod selector;

pub use selector::{CardSelectors, DetailSelectors, SelectorAdapter, SiteConfig};

use std::sync::Arc;

use crate::app::{GleanerError, Result};
use crate::scraper::SiteAdapter;

/// Adapters available to one invocation, looked up by name.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn SiteAdapter>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field(
                "adapters",
                &self.adapters.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl AdapterRegistry {
    /// Build selector adapters for every configured site.
    pub fn from_sites(sites: &[SiteConfig]) -> Result<Self> {
        let mut registry = Self::default();
        for site in sites {
            registry.register(Arc::new(SelectorAdapter::new(site.clone())?))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn SiteAdapter>) -> Result<()> {
        if self.find(adapter.name()).is_some() {
            return Err(GleanerError::Config(format!(
                "site '{}' is defined twice",
                adapter.name()
            )));
        }
        self.adapters.push(adapter);
        Ok(())
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn SiteAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn SiteAdapter>> {
        self.find(name)
            .cloned()
            .ok_or_else(|| GleanerError::UnknownSite(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SiteAdapter>> {
        self.adapters.iter()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
