//! Structured extraction output returned by the analysis provider

use serde::{Deserialize, Serialize};

/// Document classification, a closed set plus an unknown fallback
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Contract,
    Receipt,
    Report,
    IdDocument,
    Letter,
    Form,
    Unknown,
}

impl DocumentType {
    /// Parse a provider-supplied label, falling back to `Unknown` for
    /// anything outside the closed set.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "invoice" => Self::Invoice,
            "contract" => Self::Contract,
            "receipt" => Self::Receipt,
            "report" => Self::Report,
            "id_document" | "id" => Self::IdDocument,
            "letter" => Self::Letter,
            "form" => Self::Form,
            _ => Self::Unknown,
        }
    }

    /// Stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Contract => "contract",
            Self::Receipt => "receipt",
            Self::Report => "report",
            Self::IdDocument => "id_document",
            Self::Letter => "letter",
            Self::Form => "form",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider confidence in the extraction
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl Confidence {
    /// Parse a provider-supplied label, defaulting to `Medium` when the
    /// label is absent or unrecognized.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    /// Stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Structured fields detected in the document
///
/// Every category defaults to an empty list; a missing or malformed category
/// in the provider response is never an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectedFields {
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub amounts: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Result of analyzing one document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisResult {
    pub document_type: DocumentType,
    pub summary: String,
    pub extracted_text: String,
    pub detected_fields: DetectedFields,
    pub confidence: Confidence,
    /// Model that produced this result
    pub analyzed_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_type_falls_back_to_unknown() {
        assert_eq!(DocumentType::parse("invoice"), DocumentType::Invoice);
        assert_eq!(DocumentType::parse("ID_Document"), DocumentType::IdDocument);
        assert_eq!(DocumentType::parse("poem"), DocumentType::Unknown);
        assert_eq!(DocumentType::parse(""), DocumentType::Unknown);
    }

    #[test]
    fn confidence_defaults_to_medium() {
        assert_eq!(Confidence::parse("high"), Confidence::High);
        assert_eq!(Confidence::parse("LOW"), Confidence::Low);
        assert_eq!(Confidence::parse("certain"), Confidence::Medium);
        assert_eq!(Confidence::default(), Confidence::Medium);
    }
}
