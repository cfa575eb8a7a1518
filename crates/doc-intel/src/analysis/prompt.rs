//! Extraction prompt for the analysis provider

/// Build the structured-extraction prompt
///
/// The provider is instructed to answer with a single JSON object; the
/// response parser still tolerates surrounding prose and code fences.
pub fn build_extraction_prompt() -> String {
    let mut prompt = String::new();

    prompt.push_str("Analyze this document and extract key information.\n\n");

    prompt.push_str("Your task:\n");
    prompt.push_str(
        "1. Identify the document type (choose ONE): invoice, contract, receipt, report, id_document, letter, form, unknown\n",
    );
    prompt.push_str("2. Extract ALL visible text (OCR)\n");
    prompt.push_str("3. Identify structured information:\n");
    prompt.push_str("   - Dates (in YYYY-MM-DD format if possible)\n");
    prompt.push_str("   - Names of people\n");
    prompt.push_str("   - Organization/company names\n");
    prompt.push_str("   - Monetary amounts (with currency if visible)\n");
    prompt.push_str("   - Reference numbers, IDs, or codes\n");
    prompt.push_str(
        "4. Write a comprehensive summary (6-12 sentences) explaining what this document is, \
         its primary purpose, and its key points.\n",
    );
    prompt.push_str("5. Assess confidence level based on text clarity: high, medium, or low\n\n");

    prompt.push_str("Return ONLY valid JSON (no markdown, no code blocks):\n");
    prompt.push_str(
        r#"{
  "documentType": "invoice",
  "extractedText": "Full text content here...",
  "summary": "This document is a formal invoice issued by Company X to Client Y...",
  "detectedFields": {
    "dates": ["2024-12-31"],
    "names": ["John Doe"],
    "organizations": ["Company X"],
    "amounts": ["$1,234.56"],
    "references": ["INV-2024-001"]
  },
  "confidence": "high"
}
"#,
    );

    prompt
}
