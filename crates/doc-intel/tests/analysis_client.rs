//! Analysis client behavior against a stub provider server
//!
//! The stub speaks just enough of the generative API to exercise model
//! fallback ordering, per-model retry bounds and the upload side-channel.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use doc_intel::analysis::{DocumentAnalyzer, GeminiClient};
use doc_intel::config::AnalysisConfig;
use doc_intel::types::analysis::DocumentType;

/// Per-model scripted responses
#[derive(Clone)]
struct StubState {
    /// model -> list of status codes to return, last one repeating
    scripts: Arc<HashMap<String, Vec<StatusCode>>>,
    /// model -> observed call count
    calls: Arc<Mutex<HashMap<String, usize>>>,
    /// upload endpoint call count
    uploads: Arc<Mutex<usize>>,
    /// whether the upload endpoint should succeed
    upload_ok: bool,
}

impl StubState {
    fn new(scripts: HashMap<String, Vec<StatusCode>>, upload_ok: bool) -> Self {
        Self {
            scripts: Arc::new(scripts),
            calls: Arc::new(Mutex::new(HashMap::new())),
            uploads: Arc::new(Mutex::new(0)),
            upload_ok,
        }
    }

    fn calls_for(&self, model: &str) -> usize {
        self.calls.lock().get(model).copied().unwrap_or(0)
    }

    fn uploads(&self) -> usize {
        *self.uploads.lock()
    }
}

fn provider_text() -> String {
    r#"Here you go:
{"documentType": "invoice", "summary": "An invoice.", "extractedText": "Total $5",
 "detectedFields": {"amounts": ["$5"]}, "confidence": "high"}"#
        .to_string()
}

async fn generate_handler(
    State(state): State<StubState>,
    Path(action): Path<String>,
) -> impl IntoResponse {
    let model = action
        .strip_suffix(":generateContent")
        .unwrap_or(&action)
        .to_string();

    let call_number = {
        let mut calls = state.calls.lock();
        let counter = calls.entry(model.clone()).or_insert(0);
        *counter += 1;
        *counter
    };

    let script = state.scripts.get(&model).cloned().unwrap_or_default();
    let status = script
        .get(call_number - 1)
        .or_else(|| script.last())
        .copied()
        .unwrap_or(StatusCode::OK);

    if status != StatusCode::OK {
        return (status, "provider error".to_string()).into_response();
    }

    Json(serde_json::json!({
        "candidates": [{
            "content": { "parts": [{ "text": provider_text() }] }
        }]
    }))
    .into_response()
}

async fn upload_handler(State(state): State<StubState>) -> impl IntoResponse {
    *state.uploads.lock() += 1;
    if state.upload_ok {
        Json(serde_json::json!({
            "file": { "uri": "https://files.example/abc123", "mimeType": "application/pdf" }
        }))
        .into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "upload failed".to_string()).into_response()
    }
}

async fn spawn_stub(state: StubState) -> SocketAddr {
    let app = Router::new()
        .route("/v1beta/models/:action", post(generate_handler))
        .route("/upload/v1beta/files", post(upload_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_config(addr: SocketAddr, models: &[&str]) -> AnalysisConfig {
    AnalysisConfig {
        api_key: "test-key".to_string(),
        api_base: format!("http://{}", addr),
        models: models.iter().map(|m| m.to_string()).collect(),
        request_timeout_secs: 5,
        max_retries_per_model: 2,
        backoff_base_ms: 1,
        backoff_cap_ms: 5,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn model_fallback_tries_models_in_order() {
    let mut scripts = HashMap::new();
    scripts.insert(
        "model-a".to_string(),
        vec![StatusCode::INTERNAL_SERVER_ERROR],
    );
    scripts.insert("model-b".to_string(), vec![StatusCode::OK]);
    let state = StubState::new(scripts, true);
    let addr = spawn_stub(state.clone()).await;

    let client = GeminiClient::new(client_config(addr, &["model-a", "model-b"])).unwrap();
    let result = client
        .analyze(b"%PDF-1.4 tiny", "application/pdf", None)
        .await
        .unwrap();

    assert_eq!(result.analyzed_by, "model-b");
    assert_eq!(result.document_type, DocumentType::Invoice);
    assert_eq!(result.detected_fields.amounts, vec!["$5"]);
    // model-a exhausted its retry bound (1 call + 2 retries) before fallback
    assert_eq!(state.calls_for("model-a"), 3);
    assert_eq!(state.calls_for("model-b"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limits_are_retried_on_the_same_model() {
    let mut scripts = HashMap::new();
    scripts.insert(
        "model-a".to_string(),
        vec![
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::OK,
        ],
    );
    let state = StubState::new(scripts, true);
    let addr = spawn_stub(state.clone()).await;

    let client = GeminiClient::new(client_config(addr, &["model-a", "model-b"])).unwrap();
    let result = client
        .analyze(b"%PDF-1.4 tiny", "application/pdf", None)
        .await
        .unwrap();

    assert_eq!(result.analyzed_by, "model-a");
    assert_eq!(state.calls_for("model-a"), 3);
    assert_eq!(state.calls_for("model-b"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn not_found_models_are_skipped_without_retry() {
    let mut scripts = HashMap::new();
    scripts.insert("model-a".to_string(), vec![StatusCode::NOT_FOUND]);
    scripts.insert("model-b".to_string(), vec![StatusCode::OK]);
    let state = StubState::new(scripts, true);
    let addr = spawn_stub(state.clone()).await;

    let client = GeminiClient::new(client_config(addr, &["model-a", "model-b"])).unwrap();
    let result = client
        .analyze(b"%PDF-1.4 tiny", "application/pdf", None)
        .await
        .unwrap();

    assert_eq!(result.analyzed_by, "model-b");
    assert_eq!(state.calls_for("model-a"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausting_every_model_is_provider_unavailable() {
    let mut scripts = HashMap::new();
    scripts.insert(
        "model-a".to_string(),
        vec![StatusCode::INTERNAL_SERVER_ERROR],
    );
    scripts.insert(
        "model-b".to_string(),
        vec![StatusCode::INTERNAL_SERVER_ERROR],
    );
    let state = StubState::new(scripts, true);
    let addr = spawn_stub(state.clone()).await;

    let client = GeminiClient::new(client_config(addr, &["model-a", "model-b"])).unwrap();
    let err = client
        .analyze(b"%PDF-1.4 tiny", "application/pdf", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        doc_intel::analysis::AnalysisError::ProviderUnavailable(_)
    ));
    assert_eq!(state.calls_for("model-a"), 3);
    assert_eq!(state.calls_for("model-b"), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn large_payloads_use_the_upload_side_channel() {
    let mut scripts = HashMap::new();
    scripts.insert("model-a".to_string(), vec![StatusCode::OK]);
    let state = StubState::new(scripts, true);
    let addr = spawn_stub(state.clone()).await;

    let mut config = client_config(addr, &["model-a"]);
    config.inline_threshold_bytes = 16;
    // keep the payload below the text-extraction tier
    config.text_extraction_threshold_bytes = 1024 * 1024;

    let client = GeminiClient::new(config).unwrap();
    let payload = vec![0u8; 64];
    let result = client
        .analyze(&payload, "application/pdf", None)
        .await
        .unwrap();

    assert_eq!(result.analyzed_by, "model-a");
    assert_eq!(state.uploads(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_uploads_fall_back_to_inline() {
    let mut scripts = HashMap::new();
    scripts.insert("model-a".to_string(), vec![StatusCode::OK]);
    let state = StubState::new(scripts, false);
    let addr = spawn_stub(state.clone()).await;

    let mut config = client_config(addr, &["model-a"]);
    config.inline_threshold_bytes = 16;
    config.text_extraction_threshold_bytes = 1024 * 1024;

    let client = GeminiClient::new(config).unwrap();
    let payload = vec![0u8; 64];
    let result = client
        .analyze(&payload, "application/pdf", None)
        .await
        .unwrap();

    // Upload was attempted once, then the call completed inline
    assert_eq!(result.analyzed_by, "model-a");
    assert_eq!(state.uploads(), 1);
    assert_eq!(state.calls_for("model-a"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unsupported_media_is_rejected_before_any_request() {
    let state = StubState::new(HashMap::new(), true);
    let addr = spawn_stub(state.clone()).await;

    let client = GeminiClient::new(client_config(addr, &["model-a"])).unwrap();
    let err = client.analyze(b"data", "video/mp4", None).await.unwrap_err();

    assert!(matches!(
        err,
        doc_intel::analysis::AnalysisError::UnsupportedInput(_)
    ));
    assert_eq!(state.calls_for("model-a"), 0);
}
