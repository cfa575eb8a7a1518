//! Document upload and management endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::processing::DocumentJob;
use crate::types::document::{
    DocumentFilter, DocumentRecord, DocumentStats, DocumentStatus, MediaKind, NewDocument,
};

use crate::server::state::AppState;

const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "webp"];
const MAX_FILES_PER_UPLOAD: usize = 10;

/// Response from an upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub document_ids: Vec<Uuid>,
}

/// POST /api/documents/upload - Upload documents for analysis
pub async fn upload_documents(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut document_ids = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let file_name = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("upload_{}.bin", Uuid::new_v4()));
        let declared_type = field.content_type().map(|s| s.to_string());

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidRequest(format!("Failed to read {}: {}", file_name, e)))?;

        if document_ids.len() >= MAX_FILES_PER_UPLOAD {
            return Err(Error::InvalidRequest(format!(
                "Too many files in one upload (max {})",
                MAX_FILES_PER_UPLOAD
            )));
        }

        let max = state.config().server.max_upload_size as u64;
        if data.len() as u64 > max {
            return Err(Error::FileTooLarge {
                size: data.len() as u64,
                max,
            });
        }

        let media_type = resolve_media_type(&file_name, declared_type.as_deref())?;
        let extension = extension_of(&file_name);

        // Store the bytes under a unique name; the original name stays on
        // the record for display.
        let stored_name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(&file_name));
        let file_path = state.config().storage.upload_dir.join(stored_name);
        tokio::fs::write(&file_path, &data).await?;

        let record = state
            .store()
            .create_record(&NewDocument {
                file_name: file_name.clone(),
                file_type: extension,
                media_type: media_type.clone(),
                file_size: data.len() as u64,
                file_path: file_path.clone(),
                uploaded_by: Some("admin".to_string()),
            })
            .await?;

        tracing::info!(
            document_id = %record.id,
            file = %file_name,
            size_bytes = data.len(),
            "Document uploaded and queued"
        );

        state.pipeline().submit(DocumentJob {
            document_id: record.id,
            source_path: file_path,
            media_type,
        });

        document_ids.push(record.id);
    }

    if document_ids.is_empty() {
        return Err(Error::InvalidRequest("No files provided".to_string()));
    }

    Ok(Json(UploadResponse {
        success: true,
        message: format!(
            "{} document(s) uploaded and queued for processing",
            document_ids.len()
        ),
        document_ids,
    }))
}

/// Query parameters for listing documents
#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    pub status: Option<String>,
    pub document_type: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    50
}

/// Response for document listing
#[derive(Debug, Serialize)]
pub struct DocumentListResponse {
    pub data: Vec<DocumentRecord>,
    pub total: u64,
}

/// GET /api/documents - List documents with optional filters
pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<ListDocumentsQuery>,
) -> Result<Json<DocumentListResponse>> {
    let status = match params.status.as_deref() {
        Some(s) => Some(
            DocumentStatus::parse(s)
                .ok_or_else(|| Error::InvalidRequest(format!("Unknown status: {}", s)))?,
        ),
        None => None,
    };

    let filter = DocumentFilter {
        status,
        document_type: params.document_type,
        limit: params.limit,
        offset: params.page.saturating_sub(1) * params.limit,
    };

    let (data, total) = state.store().list_records(&filter).await?;
    Ok(Json(DocumentListResponse { data, total }))
}

/// GET /api/documents/stats - Document statistics
pub async fn document_stats(State(state): State<AppState>) -> Result<Json<DocumentStats>> {
    Ok(Json(state.store().stats().await?))
}

/// GET /api/documents/:id - Get a document
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentRecord>> {
    let record = state
        .store()
        .get_record(id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
    Ok(Json(record))
}

/// Response for deletions
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// DELETE /api/documents/:id - Delete a document and its file
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>> {
    let record = state
        .store()
        .get_record(id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;

    // Drop any queued job; an executing one no-ops when it finds the
    // record gone.
    state.pipeline().forget(id);

    if let Err(e) = tokio::fs::remove_file(&record.file_path).await {
        tracing::warn!(document_id = %id, "Failed to delete stored file: {}", e);
    }

    state.store().delete_record(id).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: "Document deleted".to_string(),
    }))
}

/// Request body for bulk deletion
#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
}

/// Response for bulk deletion
#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub success: bool,
    pub deleted_count: usize,
    pub message: String,
}

/// POST /api/documents/bulk-delete - Best-effort multi-delete
pub async fn bulk_delete(
    State(state): State<AppState>,
    Json(request): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>> {
    if request.ids.is_empty() {
        return Err(Error::InvalidRequest("No document IDs provided".to_string()));
    }

    let deletions = request.ids.into_iter().map(|id| {
        let state = state.clone();
        async move {
            match state.store().get_record(id).await {
                Ok(Some(record)) => {
                    state.pipeline().forget(id);
                    if let Err(e) = tokio::fs::remove_file(&record.file_path).await {
                        tracing::warn!(document_id = %id, "Failed to delete stored file: {}", e);
                    }
                    state.store().delete_record(id).await.unwrap_or(false)
                }
                Ok(None) => false,
                Err(e) => {
                    tracing::warn!(document_id = %id, "Failed to delete document: {}", e);
                    false
                }
            }
        }
    });
    let deleted_count = join_all(deletions).await.iter().filter(|ok| **ok).count();

    Ok(Json(BulkDeleteResponse {
        success: true,
        deleted_count,
        message: format!("{} document(s) deleted", deleted_count),
    }))
}

/// Resolve the media type of an upload from its declared content type or, if
/// that is absent or generic, from the file extension.
fn resolve_media_type(file_name: &str, declared: Option<&str>) -> Result<String> {
    if let Some(declared) = declared {
        if MediaKind::from_mime(declared).is_some() {
            return Ok(declared.to_ascii_lowercase());
        }
    }

    let guessed = mime_guess::from_path(file_name).first_or_octet_stream();
    let guessed = guessed.essence_str().to_ascii_lowercase();
    if MediaKind::from_mime(&guessed).is_some()
        && ALLOWED_EXTENSIONS.contains(&extension_of(file_name).as_str())
    {
        return Ok(guessed);
    }

    Err(Error::UnsupportedFileType(format!(
        "{}. Allowed: PDF, JPG, PNG, WEBP",
        declared.unwrap_or("unknown")
    )))
}

fn extension_of(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_prefers_declared_content_type() {
        assert_eq!(
            resolve_media_type("scan.bin", Some("application/pdf")).unwrap(),
            "application/pdf"
        );
        assert_eq!(
            resolve_media_type("photo.jpg", Some("image/jpeg")).unwrap(),
            "image/jpeg"
        );
    }

    #[test]
    fn media_type_falls_back_to_extension() {
        assert_eq!(
            resolve_media_type("report.pdf", Some("application/octet-stream")).unwrap(),
            "application/pdf"
        );
        assert_eq!(resolve_media_type("img.webp", None).unwrap(), "image/webp");
    }

    #[test]
    fn unsupported_uploads_are_rejected() {
        assert!(resolve_media_type("video.mp4", Some("video/mp4")).is_err());
        assert!(resolve_media_type("notes.txt", None).is_err());
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("my file (1).pdf"), "my_file__1_.pdf");
        assert_eq!(sanitize_filename("простой.pdf"), "_______.pdf");
    }
}
