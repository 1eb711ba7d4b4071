//! Batched bulk delete of remote chunk messages.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use super::channel::BlobChannel;
use super::client::{DeleteOutcome, TransportClient};
use crate::config::BulkDeleteConfig;

/// Tally of a bulk delete run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkDeleteReport {
    /// Batches dispatched.
    pub batches: usize,
    /// Messages removed.
    pub deleted: usize,
    /// Messages the channel no longer had.
    pub already_gone: usize,
    /// Handles not attempted.
    pub skipped: usize,
    /// Handles that still failed after retries, with the reason.
    pub failed: Vec<(String, String)>,
}

impl BulkDeleteReport {
    /// Handles attempted or skipped in total.
    pub fn total(&self) -> usize {
        self.deleted + self.already_gone + self.skipped + self.failed.len()
    }

    /// Whether every attempted handle is known to be gone.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn add(&mut self, handle: &str, outcome: DeleteOutcome) {
        match outcome {
            DeleteOutcome::Deleted => self.deleted += 1,
            DeleteOutcome::AlreadyGone => self.already_gone += 1,
            DeleteOutcome::Skipped => self.skipped += 1,
            DeleteOutcome::Failed(reason) => self.failed.push((handle.to_string(), reason)),
        }
    }
}

/// Fans handles out to the transport client in small concurrent batches.
///
/// Within a batch all deletes run concurrently and are joined; between
/// batches a fixed pause is added on top of the shared cooldown. A failed
/// handle never stops later batches.
pub struct BulkDeleter<C> {
    client: Arc<TransportClient<C>>,
    config: BulkDeleteConfig,
}

impl<C: BlobChannel> BulkDeleter<C> {
    /// Create a deleter over a shared client.
    pub fn new(client: Arc<TransportClient<C>>, config: BulkDeleteConfig) -> Self {
        Self { client, config }
    }

    /// Delete every message in `handles`, best-effort.
    pub async fn bulk_delete(&self, handles: &[String]) -> BulkDeleteReport {
        let mut report = BulkDeleteReport::default();
        if handles.is_empty() {
            return report;
        }

        let batch_size = self.config.batch_size.max(1);
        let batch_count = handles.len().div_ceil(batch_size);
        info!(
            "Bulk deleting {} message(s) in {} batch(es)",
            handles.len(),
            batch_count
        );

        for (i, batch) in handles.chunks(batch_size).enumerate() {
            let outcomes =
                join_all(batch.iter().map(|handle| self.client.delete_message(handle))).await;
            for (handle, outcome) in batch.iter().zip(outcomes) {
                report.add(handle, outcome);
            }
            report.batches += 1;

            if i + 1 < batch_count {
                tokio::time::sleep(self.config.batch_pause()).await;
            }
        }

        if !report.is_clean() {
            warn!(
                "Bulk delete left {} orphaned message(s) of {}",
                report.failed.len(),
                handles.len()
            );
        }
        report
    }
}
