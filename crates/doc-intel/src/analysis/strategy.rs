//! Request strategy selection and payload preparation
//!
//! Three tiers by payload size: inline base64 for compact payloads, the
//! provider's file upload side-channel above the inline threshold, and local
//! text extraction for very large PDFs to sidestep payload limits entirely.

use image::{GenericImageView, ImageFormat};
use std::io::Cursor;

use crate::config::AnalysisConfig;
use crate::types::document::MediaKind;

/// How the document content is transmitted to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStrategy {
    /// Payload embedded directly in the generation request as base64
    Inline,
    /// Bytes uploaded to the provider's file store first, then referenced
    FileUpload,
    /// Text extracted locally and sent instead of raw bytes (PDFs only)
    TextExtraction,
}

impl RequestStrategy {
    /// Pick a strategy for a payload
    ///
    /// Thresholds are inclusive lower bounds of the larger tier: a payload of
    /// exactly `inline_threshold_bytes` is routed to the file upload, and a
    /// PDF of exactly `text_extraction_threshold_bytes` to text extraction.
    pub fn select(media: MediaKind, size_bytes: u64, config: &AnalysisConfig) -> Self {
        if media == MediaKind::Pdf && size_bytes >= config.text_extraction_threshold_bytes {
            Self::TextExtraction
        } else if size_bytes >= config.inline_threshold_bytes {
            Self::FileUpload
        } else {
            Self::Inline
        }
    }
}

impl std::fmt::Display for RequestStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline => write!(f, "inline"),
            Self::FileUpload => write!(f, "file_upload"),
            Self::TextExtraction => write!(f, "text_extraction"),
        }
    }
}

/// Re-encode an image as a bounded-width JPEG to shrink the payload and
/// stabilize provider behavior across input formats.
///
/// Falls back to a plain JPEG re-encode if resizing fails, and to the
/// original bytes if the image cannot be decoded at all.
pub fn normalize_image(data: &[u8], max_width: u32, quality: u8) -> (Vec<u8>, &'static str) {
    let decoded = match image::load_from_memory(data) {
        Ok(img) => img,
        Err(e) => {
            tracing::warn!("Image decode failed, sending original bytes: {}", e);
            return (data.to_vec(), "original");
        }
    };

    let resized = if decoded.width() > max_width {
        decoded.resize(max_width, u32::MAX, image::imageops::FilterType::Lanczos3)
    } else {
        decoded
    };

    let mut out = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    match resized.to_rgb8().write_with_encoder(encoder) {
        Ok(()) => (out.into_inner(), "jpeg"),
        Err(e) => {
            tracing::warn!("JPEG re-encode failed, trying default encode: {}", e);
            let mut fallback = Cursor::new(Vec::new());
            match resized.write_to(&mut fallback, ImageFormat::Jpeg) {
                Ok(()) => (fallback.into_inner(), "jpeg"),
                Err(e) => {
                    tracing::warn!("Image normalization failed entirely: {}", e);
                    (data.to_vec(), "original")
                }
            }
        }
    }
}

/// Extract text from a PDF locally, truncating at `max_chars` with an
/// explicit marker so the provider knows the text is incomplete.
pub fn extract_pdf_text(data: &[u8], max_chars: usize) -> Result<String, String> {
    let text = pdf_extract::extract_text_from_mem(data).map_err(|e| e.to_string())?;

    if text.trim().is_empty() {
        return Err("no extractable text".to_string());
    }

    Ok(truncate_text(text, max_chars))
}

/// Cap text at `max_chars`, cutting on a char boundary and appending a
/// truncation marker when anything was dropped.
fn truncate_text(text: String, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text;
    }

    let boundary = text
        .char_indices()
        .take_while(|(i, _)| *i < max_chars)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let mut truncated = text[..boundary].to_string();
    truncated.push_str(&format!(
        "\n\n[... Text truncated. Original document has {} characters ...]",
        text.len()
    ));
    truncated
}
