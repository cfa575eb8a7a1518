//! Periodic recovery sweep
//!
//! The in-memory queue is not durable: queued-but-unstarted jobs vanish on
//! restart, and a crash mid-execution leaves a record stuck in `pending` or
//! `processing`. This sweep reconciles the store against the pipeline's
//! tracked set and re-enqueues anything forgotten, bounded by the attempt
//! ceiling. It is the sole recovery mechanism and is idempotent.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::store::DocumentStore;

use super::job_queue::DocumentJob;
use super::pipeline::ProcessingService;

/// Background sweep re-enqueuing abandoned documents
pub struct RecoveryScanner {
    store: Arc<dyn DocumentStore>,
    service: ProcessingService,
    attempt_ceiling: u32,
    interval: Duration,
}

impl RecoveryScanner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        service: ProcessingService,
        attempt_ceiling: u32,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            service,
            attempt_ceiling,
            interval,
        }
    }

    /// Spawn the sweep loop; the first tick fires immediately, which doubles
    /// as the startup recovery pass.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                match self.scan_once().await {
                    Ok(0) => {}
                    Ok(recovered) => {
                        tracing::info!(recovered, "Recovery sweep re-enqueued documents");
                    }
                    Err(e) => {
                        tracing::warn!("Recovery sweep failed: {}", e);
                    }
                }
            }
        })
    }

    /// One reconciliation pass; returns how many documents were re-enqueued
    pub async fn scan_once(&self) -> Result<usize> {
        let records = self
            .store
            .records_needing_recovery(self.attempt_ceiling)
            .await?;

        let mut recovered = 0;
        for record in records {
            if self.service.is_tracked(record.id) {
                continue;
            }
            let job = DocumentJob {
                document_id: record.id,
                source_path: record.file_path.clone(),
                media_type: record.media_type.clone(),
            };
            if self.service.submit(job) {
                tracing::debug!(
                    document_id = %record.id,
                    status = %record.status,
                    attempts = record.attempts,
                    "Recovered abandoned document"
                );
                recovered += 1;
            }
        }

        Ok(recovered)
    }
}
