//! Identity document format checks.

use crate::errors::ValidationError;
use regex::Regex;
use std::sync::OnceLock;

fn document_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{7,8}$").expect("document pattern is valid"))
}

/// Strips every non-digit character (dots, dashes, spaces).
pub fn clean_document(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// True when the cleaned document has exactly 7 or 8 digits.
pub fn is_valid_document(raw: &str) -> bool {
    document_pattern().is_match(&clean_document(raw))
}

/// Returns the cleaned document, or a `ValidationError` describing why it was refused.
pub fn validate_document(raw: &str) -> Result<String, ValidationError> {
    let cleaned = clean_document(raw);
    if document_pattern().is_match(&cleaned) {
        return Ok(cleaned);
    }

    let reason = if cleaned.is_empty() {
        "no digits found".to_string()
    } else {
        format!("expected 7 or 8 digits, got {}", cleaned.len())
    };
    tracing::warn!("❌ Invalid document '{}': {}", raw, reason);

    Err(ValidationError {
        input: raw.to_string(),
        reason,
    })
}
