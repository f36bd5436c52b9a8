//! Per-highlight validation rules.
//!
//! Rules are evaluated independently; findings are returned as data and never
//! abort a batch. Errors make a highlight undeliverable, warnings do not.

use tracing::debug;

use crate::defaults::{MAX_NOTE_LENGTH, MAX_TEXT_LENGTH, MIN_TEXT_LENGTH};
use crate::models::{Highlight, ProgressStatus, ValidationResult, ValidationSummary};

/// Validate one highlight.
///
/// `formatted_content` is the rendered note for this highlight, when the
/// caller has one; an empty rendering is an error.
pub fn validate_highlight(
    highlight: &Highlight,
    formatted_content: Option<&str>,
) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let text_len = highlight.text.chars().count();

    if highlight.text.trim().is_empty() {
        errors.push("Missing highlight text".to_string());
    }

    if text_len > 0 && text_len < MIN_TEXT_LENGTH {
        errors.push("Highlight text too short".to_string());
    }

    if text_len > MAX_TEXT_LENGTH {
        errors.push(format!(
            "Highlight text too long ({} chars, max {})",
            text_len, MAX_TEXT_LENGTH
        ));
    }

    if let Some(note) = &highlight.note {
        let note_len = note.chars().count();
        if note_len > MAX_NOTE_LENGTH {
            warnings.push(format!(
                "Note is very long ({} chars), might be truncated",
                note_len
            ));
        }
    }

    if let Some(date) = highlight.highlighted_at.as_deref() {
        if !date.is_empty() && highlight.highlighted_at_utc().is_none() {
            warnings.push("Invalid highlight date format".to_string());
        }
    }

    if highlight.resolvable_book_id().is_none() {
        warnings.push("Missing or invalid book ID".to_string());
    }

    if let Some(content) = formatted_content {
        if content.is_empty() {
            errors.push("Failed to format content for Mem".to_string());
        }
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        highlight: highlight.clone(),
        formatted_content: formatted_content.map(str::to_string),
    }
}

/// Validate a batch, pairing each highlight with its rendered content by index.
///
/// Highlights without a matching entry in `formatted_contents` are validated
/// without the formatting rule.
pub fn validate_batch(highlights: &[Highlight], formatted_contents: &[String]) -> ValidationSummary {
    let results: Vec<ValidationResult> = highlights
        .iter()
        .enumerate()
        .map(|(idx, h)| validate_highlight(h, formatted_contents.get(idx).map(String::as_str)))
        .collect();

    let mut valid = 0;
    let mut warnings = 0;
    let mut invalid = 0;
    for result in &results {
        match (result.is_valid, result.warnings.is_empty()) {
            (true, true) => valid += 1,
            (true, false) => warnings += 1,
            (false, _) => invalid += 1,
        }
    }

    debug!(
        total = results.len(),
        valid, warnings, invalid, "Validation batch complete"
    );

    ValidationSummary {
        total: highlights.len(),
        valid,
        warnings,
        invalid,
        status: ProgressStatus::Complete,
        results,
    }
}
