//! API routes for the document analysis server

pub mod documents;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/documents/upload",
            post(documents::upload_documents).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/documents", get(documents::list_documents))
        .route("/documents/stats", get(documents::document_stats))
        .route("/documents/:id", get(documents::get_document))
        .route("/documents/:id", delete(documents::delete_document))
        .route("/documents/bulk-delete", post(documents::bulk_delete))
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "doc-intel",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Document analysis service with queued AI extraction",
        "endpoints": {
            "POST /api/documents/upload": "Upload documents for analysis",
            "GET /api/documents": "List documents with optional filters",
            "GET /api/documents/stats": "Document statistics",
            "GET /api/documents/:id": "Get document details",
            "DELETE /api/documents/:id": "Delete a document and its file",
            "POST /api/documents/bulk-delete": "Delete multiple documents"
        }
    }))
}
