//! doc-intel: document analysis service with a bounded-concurrency processing pipeline
//!
//! Uploaded PDFs and images are queued, dispatched to an external
//! document-understanding provider under a concurrency ceiling, retried with
//! backoff on transient failures, and recovered after restarts by a periodic
//! sweep of the durable document store.

pub mod analysis;
pub mod config;
pub mod error;
pub mod processing;
pub mod server;
pub mod store;
pub mod types;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use types::{
    analysis::{AnalysisResult, Confidence, DetectedFields, DocumentType},
    document::{DocumentRecord, DocumentStatus, MediaKind},
};
