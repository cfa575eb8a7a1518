//! Document records and their processing state machine

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

use super::analysis::AnalysisResult;

/// Processing status of a document record
///
/// Transitions: `Pending -> Processing -> {Completed | Pending | Failed}`.
/// A record never sits in `Processing` forever: the recovery sweep picks up
/// records abandoned mid-flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Parse from the stored string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad media kind of an uploaded file, derived from its MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Image,
}

impl MediaKind {
    /// Classify a MIME type, returning `None` for anything the pipeline
    /// cannot analyze.
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.eq_ignore_ascii_case("application/pdf") {
            Some(Self::Pdf)
        } else if mime
            .to_ascii_lowercase()
            .strip_prefix("image/")
            .is_some_and(|sub| matches!(sub, "jpeg" | "jpg" | "png" | "webp"))
        {
            Some(Self::Image)
        } else {
            None
        }
    }
}

/// A document record as stored in the document store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique document ID
    pub id: Uuid,
    /// Original filename as uploaded
    pub file_name: String,
    /// Short file type tag (pdf, jpg, png, webp)
    pub file_type: String,
    /// Full MIME type, used to pick the analysis strategy
    pub media_type: String,
    /// File size in bytes
    pub file_size: u64,
    /// Path to the stored file bytes
    pub file_path: PathBuf,
    /// Processing status
    pub status: DocumentStatus,
    /// Execution attempts consumed so far
    pub attempts: u32,
    /// Last failure description, cleared on success
    pub error_message: Option<String>,
    /// Extraction output, present only when completed
    pub analysis: Option<AnalysisResult>,
    /// Uploading user
    pub uploaded_by: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Fields required to create a new document record
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub file_name: String,
    pub file_type: String,
    pub media_type: String,
    pub file_size: u64,
    pub file_path: PathBuf,
    pub uploaded_by: Option<String>,
}

/// Filters for listing documents
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub status: Option<DocumentStatus>,
    pub document_type: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

/// Aggregate document statistics
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStats {
    pub total: u64,
    pub by_status: HashMap<String, u64>,
    pub by_type: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("application/pdf"), Some(MediaKind::Pdf));
        assert_eq!(MediaKind::from_mime("image/jpeg"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("image/webp"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("IMAGE/PNG"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("image/tiff"), None);
        assert_eq!(MediaKind::from_mime("text/plain"), None);
    }

    #[test]
    fn status_round_trips_through_string_form() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("bogus"), None);
    }
}
