//! Shared types for documents and analysis results

pub mod analysis;
pub mod document;

pub use analysis::{AnalysisResult, Confidence, DetectedFields, DocumentType};
pub use document::{
    DocumentFilter, DocumentRecord, DocumentStats, DocumentStatus, MediaKind, NewDocument,
};
