pub mod export;
pub mod filter;

use std::{path::PathBuf, sync::Arc};

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    device::{DeviceApi, TransportError, TransportErrorKind},
    models::HistoryRecord,
};

pub use self::{
    export::{to_csv, write_file, ExportError, EXPORT_FILENAME},
    filter::{filter, newest_first, summarize, FilterCriteria, Summary, TypeFilter},
};

#[derive(Debug, Default)]
struct Cached {
    records: Vec<HistoryRecord>,
    last_error: Option<TransportErrorKind>,
}

/// Locally cached batch of the controller's history log.
///
/// Filtering, summaries and exports all run over whatever is cached; none of
/// them fail on an empty cache.
#[derive(Clone)]
pub struct HistoryService {
    device: Arc<dyn DeviceApi>,
    cache: Arc<RwLock<Cached>>,
}

impl HistoryService {
    pub fn new(device: Arc<dyn DeviceApi>) -> Self {
        Self {
            device,
            cache: Arc::default(),
        }
    }

    /// Replace the cache with a fresh batch. On failure the cache is emptied
    /// and the error kind kept for display.
    pub async fn refresh(&self) -> Result<usize, TransportError> {
        let result = self.device.fetch_history().await;
        let mut cache = self.cache.write().await;

        match result {
            Ok(records) => {
                let count = records.len();
                cache.records = records;
                cache.last_error = None;
                info!(records = count, "History refreshed");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "History fetch failed; cache cleared");
                cache.records.clear();
                cache.last_error = Some(e.kind());
                Err(e)
            }
        }
    }

    pub async fn records(&self) -> Vec<HistoryRecord> {
        self.cache.read().await.records.clone()
    }

    pub async fn last_error(&self) -> Option<TransportErrorKind> {
        self.cache.read().await.last_error
    }

    pub async fn filtered(&self, criteria: &FilterCriteria) -> Vec<HistoryRecord> {
        filter(&self.cache.read().await.records, criteria)
    }

    pub async fn summary(&self, criteria: &FilterCriteria) -> Summary {
        summarize(&self.filtered(criteria).await)
    }

    pub async fn export_csv(&self, criteria: &FilterCriteria) -> Result<String, ExportError> {
        to_csv(&self.filtered(criteria).await)
    }

    /// Write the filtered view to `dir/irrigation_history.csv`.
    pub async fn export_file(
        &self,
        dir: PathBuf,
        criteria: &FilterCriteria,
    ) -> Result<PathBuf, ExportError> {
        let records = self.filtered(criteria).await;
        let count = records.len();
        let path = tokio::task::spawn_blocking(move || write_file(&dir, &records))
            .await
            .map_err(|e| ExportError::Io {
                path: PathBuf::from(EXPORT_FILENAME),
                source: std::io::Error::other(e),
            })??;
        info!(path = %path.display(), records = count, "History exported");
        Ok(path)
    }
}
