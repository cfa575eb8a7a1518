//! Document store abstraction
//!
//! The pipeline treats the store as an external transactional resource: each
//! status or attempt mutation is a single independent write, never a
//! transaction spanning the external analysis call.

mod sqlite;

pub use sqlite::SqliteDocumentStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::analysis::AnalysisResult;
use crate::types::document::{
    DocumentFilter, DocumentRecord, DocumentStats, DocumentStatus, NewDocument,
};

/// Durable record store for document metadata and processing state
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a new record in `pending` state with zero attempts
    async fn create_record(&self, doc: &NewDocument) -> Result<DocumentRecord>;

    /// Fetch a record, `None` if it has been deleted
    async fn get_record(&self, id: Uuid) -> Result<Option<DocumentRecord>>;

    /// List records matching the filter, returning the page and the total count
    async fn list_records(&self, filter: &DocumentFilter) -> Result<(Vec<DocumentRecord>, u64)>;

    /// Aggregate counts by status and detected document type
    async fn stats(&self) -> Result<DocumentStats>;

    /// Set the status and error message; pass `None` to clear the error
    async fn set_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Persist the analysis result, mark the record completed and clear the error
    async fn complete_record(&self, id: Uuid, result: &AnalysisResult) -> Result<()>;

    /// Increment the attempt counter, returning the new count
    ///
    /// Called exactly once per execution attempt, before the external call,
    /// so a crash mid-call is visible as a consumed attempt.
    async fn increment_attempts(&self, id: Uuid) -> Result<u32>;

    /// Records whose status implies unfinished work (`pending` or
    /// `processing`) and whose attempts are below the ceiling
    async fn records_needing_recovery(&self, attempt_ceiling: u32) -> Result<Vec<DocumentRecord>>;

    /// Delete a record, returning whether it existed
    async fn delete_record(&self, id: Uuid) -> Result<bool>;
}
