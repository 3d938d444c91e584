use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::app::{GleanerError, Result};
use crate::fetcher::{html_to_text, Fetcher, DEFAULT_WORKERS};

/// Fetches many URLs with at most `workers` requests in flight.
pub struct ParallelFetcher {
    fetcher: Arc<dyn Fetcher>,
    semaphore: Arc<Semaphore>,
}

impl ParallelFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_workers(fetcher, DEFAULT_WORKERS)
    }

    pub fn with_workers(fetcher: Arc<dyn Fetcher>, workers: usize) -> Self {
        Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Fetch every URL and reduce each body to plain text.
    ///
    /// Results come back in input order, one per URL.
    pub async fn fetch_all(&self, urls: Vec<String>) -> Vec<(String, Result<String>)> {
        let mut handles = Vec::with_capacity(urls.len());

        for url in urls {
            let fetcher = self.fetcher.clone();
            let semaphore = self.semaphore.clone();
            let task_url = url.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| GleanerError::Other(format!("Worker pool closed: {}", e)))?;
                let body = fetcher.fetch(&task_url).await?;
                Ok::<_, GleanerError>(html_to_text(&body))
            });

            handles.push((url, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (url, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Task join error for {}: {}", url, e);
                    Err(GleanerError::Other(format!("Fetch task failed: {}", e)))
                }
            };
            match &result {
                Ok(text) => debug!("{}: {} chars of text", url, text.len()),
                Err(e) => warn!("Could not fetch {}: {}", url, e),
            }
            results.push((url, result));
        }

        results
    }
}
