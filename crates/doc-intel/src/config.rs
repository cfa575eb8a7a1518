//! Configuration for the document analysis service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage paths
    #[serde(default)]
    pub storage: StorageConfig,
    /// Provider/analysis configuration
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Job processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist. The provider API key may always be supplied via
    /// the `GEMINI_API_KEY` environment variable, which takes precedence.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Failed to parse {}: {}", p.display(), e)))?
            }
            _ => Self::default(),
        };

        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            let key = key.trim().to_string();
            if !key.is_empty() {
                config.analysis.api_key = key;
            }
        }

        Ok(config)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            enable_cors: true,
            max_upload_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// Storage paths for the database and uploaded files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,
    /// Directory for uploaded document files
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/documents.db"),
            upload_dir: PathBuf::from("data/uploads"),
        }
    }
}

/// Provider/analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Provider API key (or set GEMINI_API_KEY)
    #[serde(default)]
    pub api_key: String,
    /// Provider API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Models to try, in priority order
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Bounded retries per model for rate-limit/transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries_per_model: u32,
    /// Base backoff delay in milliseconds, doubles per retry
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Backoff delay cap in milliseconds
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,
    /// Payloads at or above this size use the provider file upload
    /// side-channel instead of inline encoding (default: 2MB)
    #[serde(default = "default_inline_threshold")]
    pub inline_threshold_bytes: u64,
    /// PDFs at or above this size have their text extracted locally
    /// instead of sending raw bytes (default: 5MB)
    #[serde(default = "default_text_extraction_threshold")]
    pub text_extraction_threshold_bytes: u64,
    /// Character cap for locally extracted text
    #[serde(default = "default_max_extracted_chars")]
    pub max_extracted_chars: usize,
    /// Maximum width for normalized images (no enlargement)
    #[serde(default = "default_image_max_width")]
    pub image_max_width: u32,
    /// JPEG quality for normalized images
    #[serde(default = "default_image_jpeg_quality")]
    pub image_jpeg_quality: u8,
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_models() -> Vec<String> {
    vec![
        "gemini-2.0-flash".to_string(),
        "gemini-2.0-flash-exp".to_string(),
        "gemini-1.5-flash".to_string(),
        "gemini-1.5-pro".to_string(),
    ]
}

fn default_request_timeout() -> u64 {
    210
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    20_000
}

fn default_backoff_cap() -> u64 {
    60_000
}

fn default_inline_threshold() -> u64 {
    2 * 1024 * 1024
}

fn default_text_extraction_threshold() -> u64 {
    5 * 1024 * 1024
}

fn default_max_extracted_chars() -> usize {
    50_000
}

fn default_image_max_width() -> u32 {
    2000
}

fn default_image_jpeg_quality() -> u8 {
    90
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
            models: default_models(),
            request_timeout_secs: default_request_timeout(),
            max_retries_per_model: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
            inline_threshold_bytes: default_inline_threshold(),
            text_extraction_threshold_bytes: default_text_extraction_threshold(),
            max_extracted_chars: default_max_extracted_chars(),
            image_max_width: default_image_max_width(),
            image_jpeg_quality: default_image_jpeg_quality(),
        }
    }
}

impl AnalysisConfig {
    /// Per-request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base backoff delay as a Duration
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Backoff cap as a Duration
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
}

/// Job processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum number of concurrently executing jobs
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum execution attempts before a document is terminally failed
    #[serde(default = "default_attempt_ceiling")]
    pub attempt_ceiling: u32,
    /// Recovery sweep interval in seconds
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_secs: u64,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_attempt_ceiling() -> u32 {
    3
}

fn default_recovery_interval() -> u64 {
    30
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            attempt_ceiling: default_attempt_ceiling(),
            recovery_interval_secs: default_recovery_interval(),
        }
    }
}

impl ProcessingConfig {
    /// Recovery sweep interval as a Duration
    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }
}
