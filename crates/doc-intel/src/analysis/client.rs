//! Gemini generative API client
//!
//! One `analyze` call walks the prioritized model list; each model gets a
//! bounded number of retries with capped exponential backoff for rate-limit
//! and transient failures before the next model is tried. The request
//! strategy (inline, file upload, local text) is chosen once per call from
//! the payload size, with each tier falling back to the next cheaper one on
//! preparation failure.

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::types::analysis::{AnalysisResult, Confidence, DetectedFields, DocumentType};
use crate::types::document::MediaKind;

use super::prompt::build_extraction_prompt;
use super::strategy::{extract_pdf_text, normalize_image, RequestStrategy};
use super::{AnalysisError, DocumentAnalyzer};

/// Client for the Gemini generative API
pub struct GeminiClient {
    http: reqwest::Client,
    config: AnalysisConfig,
}

impl GeminiClient {
    /// Create a new client
    ///
    /// Fails fast when the API key is absent or no models are configured, so
    /// a misconfigured deployment is caught at startup rather than on the
    /// first upload.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::Config(
                "Analysis API key is not set (set GEMINI_API_KEY or [analysis].api_key)"
                    .to_string(),
            ));
        }
        if config.models.is_empty() {
            return Err(Error::Config(
                "No analysis models configured ([analysis].models)".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { http, config })
    }

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.api_base, model, self.config.api_key
        )
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/v1beta/files?uploadType=media&key={}",
            self.config.api_base, self.config.api_key
        )
    }

    /// Upload raw bytes to the provider's file side-channel, returning the
    /// file reference to embed in the generation request.
    async fn upload_file(
        &self,
        data: &[u8],
        mime_type: &str,
    ) -> std::result::Result<UploadedFile, AnalysisError> {
        let response = self
            .http
            .post(self.upload_url())
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(data.to_vec())
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, "file upload"));
        }

        let uploaded: UploadResponse = response.json().await.map_err(|e| {
            AnalysisError::MalformedResponse(format!("Unparseable upload response: {}", e))
        })?;

        Ok(uploaded.file)
    }

    /// Build the request parts for the selected strategy, falling back tier
    /// by tier: text extraction -> file upload -> inline.
    async fn prepare_parts(
        &self,
        data: &[u8],
        media: MediaKind,
        mime_type: &str,
    ) -> (Vec<Part>, RequestStrategy) {
        let prompt = build_extraction_prompt();
        let mut strategy = RequestStrategy::select(media, data.len() as u64, &self.config);

        if strategy == RequestStrategy::TextExtraction {
            match extract_pdf_text(data, self.config.max_extracted_chars) {
                Ok(text) => {
                    let parts = vec![Part::Text {
                        text: format!("{}\n\nDocument Text:\n{}", prompt, text),
                    }];
                    return (parts, strategy);
                }
                Err(e) => {
                    tracing::warn!("Local text extraction failed: {}. Trying file upload.", e);
                    strategy = RequestStrategy::FileUpload;
                }
            }
        }

        if strategy == RequestStrategy::FileUpload {
            match self.upload_file(data, mime_type).await {
                Ok(file) => {
                    let parts = vec![
                        Part::File {
                            file_data: FileRef {
                                mime_type: file.mime_type.unwrap_or_else(|| mime_type.to_string()),
                                file_uri: file.uri,
                            },
                        },
                        Part::Text { text: prompt },
                    ];
                    return (parts, strategy);
                }
                Err(e) => {
                    tracing::warn!("File upload failed: {}. Falling back to inline.", e);
                    strategy = RequestStrategy::Inline;
                }
            }
        }

        let (bytes, inline_mime) = match media {
            MediaKind::Pdf => (data.to_vec(), "application/pdf".to_string()),
            MediaKind::Image => {
                let (bytes, encoding) = normalize_image(
                    data,
                    self.config.image_max_width,
                    self.config.image_jpeg_quality,
                );
                let mime = if encoding == "jpeg" {
                    "image/jpeg".to_string()
                } else {
                    mime_type.to_string()
                };
                (bytes, mime)
            }
        };

        let parts = vec![
            Part::Inline {
                inline_data: Blob {
                    mime_type: inline_mime,
                    data: base64::engine::general_purpose::STANDARD.encode(bytes),
                },
            },
            Part::Text { text: prompt },
        ];
        (parts, strategy)
    }

    /// Single generation request against one model
    async fn generate(
        &self,
        model: &str,
        parts: &[Part],
    ) -> std::result::Result<String, AnalysisError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: parts.to_vec(),
            }],
            generation_config: GenerationConfig { temperature: 0.1 },
        };

        let response = self
            .http
            .post(self.generate_url(model))
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, model));
        }

        let gen_response: GenerateResponse = response.json().await.map_err(|e| {
            AnalysisError::MalformedResponse(format!("Unparseable response from {}: {}", model, e))
        })?;

        gen_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| {
                AnalysisError::MalformedResponse(format!("No text in {} response", model))
            })
    }

    /// Backoff delay before retry number `attempt` on the same model:
    /// base doubling per attempt, capped.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay_ms = self
            .config
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.config.backoff_cap_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
impl DocumentAnalyzer for GeminiClient {
    async fn analyze(
        &self,
        data: &[u8],
        media_type: &str,
        source_path: Option<&Path>,
    ) -> std::result::Result<AnalysisResult, AnalysisError> {
        let media = MediaKind::from_mime(media_type).ok_or_else(|| {
            AnalysisError::UnsupportedInput(format!("media type {} is not analyzable", media_type))
        })?;

        let (parts, strategy) = self.prepare_parts(data, media, media_type).await;
        tracing::info!(
            size_bytes = data.len(),
            strategy = %strategy,
            source = %source_path.map(|p| p.display().to_string()).unwrap_or_default(),
            "Starting document analysis"
        );

        let mut last_error: Option<AnalysisError> = None;

        for model in &self.config.models {
            let mut attempt: u32 = 0;
            loop {
                attempt += 1;

                let outcome = self
                    .generate(model, &parts)
                    .await
                    .and_then(|text| parse_analysis(&text, model));

                match outcome {
                    Ok(result) => {
                        tracing::info!(
                            model = %model,
                            attempt,
                            document_type = %result.document_type,
                            "Document analysis succeeded"
                        );
                        return Ok(result);
                    }
                    Err(err) => {
                        let retry_same_model = matches!(
                            err,
                            AnalysisError::RateLimited(_) | AnalysisError::Transient(_)
                        ) && attempt <= self.config.max_retries_per_model;

                        if retry_same_model {
                            let delay = self.backoff_delay(attempt);
                            tracing::warn!(
                                model = %model,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "Retryable failure on model: {}",
                                err
                            );
                            last_error = Some(err);
                            tokio::time::sleep(delay).await;
                            continue;
                        }

                        tracing::warn!(model = %model, attempt, "Model failed, moving to next: {}", err);
                        last_error = Some(err);
                        break;
                    }
                }
            }
        }

        Err(AnalysisError::ProviderUnavailable(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no models configured".to_string()),
        ))
    }
}

/// Classify connection-level failures: the provider was never reached or cut
/// us off mid-flight, so a retry may succeed.
fn classify_send_error(err: reqwest::Error) -> AnalysisError {
    AnalysisError::Transient(err.to_string())
}

/// Classify an HTTP error status
fn classify_status(status: StatusCode, body: &str, context: &str) -> AnalysisError {
    let detail = format!("{}: {} {}", context, status.as_u16(), snippet(body));

    if status == StatusCode::TOO_MANY_REQUESTS
        || body.contains("RESOURCE_EXHAUSTED")
        || body.contains("quota")
    {
        AnalysisError::RateLimited(detail)
    } else if status.is_server_error() {
        AnalysisError::Transient(detail)
    } else {
        // 4xx: this model cannot serve the request (not found, rejected
        // payload); the next model in the fallback list may still succeed.
        AnalysisError::MalformedResponse(detail)
    }
}

fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    body[..end].trim()
}

/// Parse the provider's raw text into an [`AnalysisResult`]
///
/// Tolerates prose and code fences around the payload by extracting the
/// first balanced JSON object. Every field defaults rather than erroring;
/// only total unparseability fails the attempt.
fn parse_analysis(text: &str, model: &str) -> std::result::Result<AnalysisResult, AnalysisError> {
    let json = extract_json_object(text).ok_or_else(|| {
        AnalysisError::MalformedResponse(format!("No JSON object in {} response", model))
    })?;

    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
        AnalysisError::MalformedResponse(format!("Invalid JSON from {}: {}", model, e))
    })?;

    let fields = value.get("detectedFields");
    let string_list = |key: &str| -> Vec<String> {
        fields
            .and_then(|f| f.get(key))
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    };

    Ok(AnalysisResult {
        document_type: value
            .get("documentType")
            .and_then(|v| v.as_str())
            .map(DocumentType::parse)
            .unwrap_or(DocumentType::Unknown),
        summary: value
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or("No summary available")
            .to_string(),
        extracted_text: value
            .get("extractedText")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        detected_fields: DetectedFields {
            dates: string_list("dates"),
            names: string_list("names"),
            organizations: string_list("organizations"),
            amounts: string_list("amounts"),
            references: string_list("references"),
        },
        confidence: value
            .get("confidence")
            .and_then(|v| v.as_str())
            .map(Confidence::parse)
            .unwrap_or_default(),
        analyzed_by: model.to_string(),
    })
}

/// Find the first balanced JSON object in free-form text
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct GenerationConfig {
    /// Low temperature for consistent extraction
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileRef,
    },
}

#[derive(Debug, Clone, Serialize)]
struct Blob {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
struct FileRef {
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(rename = "fileUri")]
    file_uri: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Deserialize)]
struct UploadedFile {
    uri: String,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_surrounding_prose() {
        let text = r#"Sure, here is the result:
```json
{"documentType": "invoice", "summary": "ok"}
```
Let me know if you need anything else."#;
        let json = extract_json_object(text).unwrap();
        assert_eq!(json, r#"{"documentType": "invoice", "summary": "ok"}"#);
    }

    #[test]
    fn nested_objects_and_braces_in_strings_are_balanced() {
        let text = r#"prefix {"a": {"b": "has } brace"}, "c": 1} suffix"#;
        let json = extract_json_object(text).unwrap();
        assert_eq!(json, r#"{"a": {"b": "has } brace"}, "c": 1}"#);
    }

    #[test]
    fn missing_categories_default_to_empty() {
        let text = r#"{
            "documentType": "receipt",
            "summary": "A receipt.",
            "extractedText": "Total 12.00",
            "detectedFields": {"dates": ["2024-01-02"]},
            "confidence": "high"
        }"#;
        let result = parse_analysis(text, "gemini-test").unwrap();
        assert_eq!(result.document_type, DocumentType::Receipt);
        assert_eq!(result.detected_fields.dates, vec!["2024-01-02"]);
        assert!(result.detected_fields.amounts.is_empty());
        assert!(result.detected_fields.names.is_empty());
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.analyzed_by, "gemini-test");
    }

    #[test]
    fn malformed_categories_default_to_empty() {
        let text = r#"{"documentType": "invoice", "detectedFields": {"amounts": "not a list", "dates": [1, 2]}}"#;
        let result = parse_analysis(text, "gemini-test").unwrap();
        assert!(result.detected_fields.amounts.is_empty());
        assert!(result.detected_fields.dates.is_empty());
    }

    #[test]
    fn unknown_type_and_absent_confidence_get_defaults() {
        let result = parse_analysis(r#"{"documentType": "sonnet"}"#, "gemini-test").unwrap();
        assert_eq!(result.document_type, DocumentType::Unknown);
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(result.summary, "No summary available");
        assert_eq!(result.extracted_text, "");
    }

    #[test]
    fn total_unparseability_is_a_hard_failure() {
        assert!(matches!(
            parse_analysis("I could not read the document.", "gemini-test"),
            Err(AnalysisError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_analysis("{broken json", "gemini-test"),
            Err(AnalysisError::MalformedResponse(_))
        ));
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "", "m"),
            AnalysisError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::OK, "RESOURCE_EXHAUSTED", "m"),
            AnalysisError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "", "m"),
            AnalysisError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "model not found", "m"),
            AnalysisError::MalformedResponse(_)
        ));
    }
}
