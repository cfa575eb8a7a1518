//! Bounded-concurrency processing service
//!
//! Owns the only mutable shared state in the pipeline: the FIFO queue and
//! the active set, both behind a single lock and mutated exclusively through
//! the scheduling entry points here. Queue draining is event-driven: every
//! enqueue and every job completion re-invokes `schedule()`; there is no
//! polling interval.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::analysis::{AnalysisError, DocumentAnalyzer};
use crate::error::Result;
use crate::store::DocumentStore;
use crate::types::document::{DocumentStatus, MediaKind};

use super::job_queue::{DocumentJob, JobQueue};
use super::retry::{RetryDecision, RetryPolicy};

/// Queue and active-set state, guarded by one lock so the same document can
/// never be double-dispatched between the event-driven scheduler and the
/// recovery sweep.
struct Scheduler {
    queue: JobQueue,
    active: HashSet<Uuid>,
}

struct Inner {
    store: Arc<dyn DocumentStore>,
    analyzer: Arc<dyn DocumentAnalyzer>,
    policy: RetryPolicy,
    max_concurrent: usize,
    upload_dir: PathBuf,
    scheduler: Mutex<Scheduler>,
}

/// Handle to the processing pipeline
///
/// Cheap to clone; all clones share the same queue and worker pool.
#[derive(Clone)]
pub struct ProcessingService {
    inner: Arc<Inner>,
}

impl ProcessingService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        analyzer: Arc<dyn DocumentAnalyzer>,
        policy: RetryPolicy,
        max_concurrent: usize,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                analyzer,
                policy,
                max_concurrent: max_concurrent.max(1),
                upload_dir,
                scheduler: Mutex::new(Scheduler {
                    queue: JobQueue::new(),
                    active: HashSet::new(),
                }),
            }),
        }
    }

    /// Enqueue a document for processing; idempotent per document id
    ///
    /// Returns false when a job for the id is already queued or executing.
    pub fn submit(&self, job: DocumentJob) -> bool {
        let id = job.document_id;
        {
            let mut scheduler = self.inner.scheduler.lock();
            if scheduler.active.contains(&id) {
                tracing::debug!(document_id = %id, "Already executing, submit ignored");
                return false;
            }
            if !scheduler.queue.enqueue(job) {
                tracing::debug!(document_id = %id, "Already queued, submit ignored");
                return false;
            }
        }
        self.schedule();
        true
    }

    /// Whether the pipeline currently tracks this document (queued or executing)
    pub fn is_tracked(&self, id: Uuid) -> bool {
        let scheduler = self.inner.scheduler.lock();
        scheduler.active.contains(&id) || scheduler.queue.contains(id)
    }

    /// Drop a queued job (e.g. after the record was deleted). An executing
    /// job cannot be cancelled; it no-ops once it sees the record is gone.
    pub fn forget(&self, id: Uuid) -> bool {
        self.inner.scheduler.lock().queue.remove(id)
    }

    /// Number of currently executing jobs
    pub fn active_count(&self) -> usize {
        self.inner.scheduler.lock().active.len()
    }

    /// Number of queued jobs
    pub fn queued_count(&self) -> usize {
        self.inner.scheduler.lock().queue.len()
    }

    /// Launch queued jobs while execution slots are free
    fn schedule(&self) {
        let mut launched = Vec::new();
        {
            let mut scheduler = self.inner.scheduler.lock();
            while scheduler.active.len() < self.inner.max_concurrent {
                let Some(job) = scheduler.queue.dequeue() else {
                    break;
                };
                scheduler.active.insert(job.document_id);
                launched.push(job);
            }
        }

        for job in launched {
            let service = self.clone();
            tokio::spawn(async move {
                service.run_job(job).await;
            });
        }
    }

    /// Run one job to completion, then free the slot and drain the queue again
    async fn run_job(&self, job: DocumentJob) {
        let id = job.document_id;
        if let Err(e) = self.execute(&job).await {
            // Store-level failure; the record stays visible to the recovery
            // sweep, which will re-enqueue it on a later tick.
            tracing::error!(document_id = %id, "Job bookkeeping failed: {}", e);
        }

        self.inner.scheduler.lock().active.remove(&id);
        self.schedule();
    }

    /// Execute one analysis attempt for a document
    async fn execute(&self, job: &DocumentJob) -> Result<()> {
        let id = job.document_id;
        let store = &self.inner.store;

        let Some(record) = store.get_record(id).await? else {
            tracing::debug!(document_id = %id, "Record deleted before execution, skipping");
            return Ok(());
        };

        // Unsupported media is terminal before an attempt is consumed:
        // no strategy can ever handle it.
        if MediaKind::from_mime(&job.media_type).is_none() {
            let err = AnalysisError::UnsupportedInput(format!(
                "media type {} is not analyzable",
                job.media_type
            ));
            tracing::warn!(document_id = %id, "{}", err);
            store
                .set_status(id, DocumentStatus::Failed, Some(&err.to_string()))
                .await?;
            return Ok(());
        }

        // Attempt consumed before the external call, so a crash mid-call is
        // visible to the recovery sweep as a used attempt.
        let attempts = store.increment_attempts(id).await?;
        store.set_status(id, DocumentStatus::Processing, None).await?;
        tracing::info!(
            document_id = %id,
            attempt = attempts,
            file = %record.file_name,
            "Processing document"
        );

        let bytes = match self.read_source(job).await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.settle_failure(job, attempts, err).await?;
                return Ok(());
            }
        };

        match self
            .inner
            .analyzer
            .analyze(&bytes, &job.media_type, Some(&job.source_path))
            .await
        {
            Ok(result) => {
                store.complete_record(id, &result).await?;
                tracing::info!(
                    document_id = %id,
                    document_type = %result.document_type,
                    confidence = result.confidence.as_str(),
                    "Document analysis completed"
                );
            }
            Err(err) => self.settle_failure(job, attempts, err).await?,
        }

        Ok(())
    }

    /// Apply the retry policy to a failed attempt
    async fn settle_failure(
        &self,
        job: &DocumentJob,
        attempts: u32,
        err: AnalysisError,
    ) -> Result<()> {
        let id = job.document_id;

        match self.inner.policy.decide(attempts, &err) {
            RetryDecision::Retry { delay } => {
                tracing::warn!(
                    document_id = %id,
                    attempt = attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    "Attempt failed, will retry: {}",
                    err
                );
                self.inner
                    .store
                    .set_status(
                        id,
                        DocumentStatus::Pending,
                        Some(&format!("attempt {} failed: {}", attempts, err)),
                    )
                    .await?;

                // Delayed re-enqueue on a detached timer so the backoff
                // window never occupies an execution slot. The recovery
                // sweep may also pick the record up; both paths dedupe.
                let service = self.clone();
                let job = job.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    service.submit(job);
                });
            }
            RetryDecision::Fail => {
                let reason = if err.is_retryable() {
                    format!("failed after {} attempts: {}", attempts, err)
                } else {
                    format!("permanent failure: {}", err)
                };
                tracing::error!(document_id = %id, "Document terminally failed: {}", reason);
                self.inner
                    .store
                    .set_status(id, DocumentStatus::Failed, Some(&reason))
                    .await?;
            }
        }

        Ok(())
    }

    /// Read the source bytes, trying the upload directory as a fallback
    /// location before classifying the file as missing.
    async fn read_source(&self, job: &DocumentJob) -> std::result::Result<Vec<u8>, AnalysisError> {
        match tokio::fs::read(&job.source_path).await {
            Ok(bytes) => Ok(bytes),
            Err(primary_err) => {
                if let Some(name) = job.source_path.file_name() {
                    let fallback = self.inner.upload_dir.join(name);
                    if fallback != job.source_path {
                        if let Ok(bytes) = tokio::fs::read(&fallback).await {
                            tracing::warn!(
                                document_id = %job.document_id,
                                "Source found at fallback location {}",
                                fallback.display()
                            );
                            return Ok(bytes);
                        }
                    }
                }
                Err(AnalysisError::MissingInput(format!(
                    "{}: {}",
                    job.source_path.display(),
                    primary_err
                )))
            }
        }
    }
}
