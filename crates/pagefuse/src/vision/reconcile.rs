//! Replace-or-append reconciliation of candidate texts.
//!
//! The same policy governs OCR text against native text and vision text
//! against whatever the page already has:
//!
//! - existing text empty: the new text replaces it (not a supplement)
//! - both non-empty: the new text is appended under a labelled header
//! - new text empty: the existing text is kept unchanged
//!
//! Neither source is ever discarded.

use std::collections::BTreeMap;

use super::parser::parse_response;
use crate::error::CapabilityError;
use crate::table::dedupe;
use crate::types::{ExtractionSource, ReconciliationResult, TableBlock};

pub const VISION_SUPPLEMENT_HEADER: &str = "Vision-derived supplement:";
pub const OCR_SUPPLEMENT_HEADER: &str = "OCR-derived supplement:";

/// Append `addition` to `existing` under `header`, or replace an empty `existing`.
///
/// Returns the combined text and whether a supplement was appended.
pub fn supplement(existing: &str, addition: &str, header: &str) -> (String, bool) {
    if existing.trim().is_empty() {
        return (addition.to_string(), false);
    }
    if addition.trim().is_empty() {
        return (existing.to_string(), false);
    }

    let text = format!("{}\n\n{}\n{}", existing.trim_end(), header, addition.trim());
    (text, true)
}

/// Combine existing page text with vision text.
pub fn reconcile(existing_text: &str, vision_text: &str) -> (String, bool) {
    supplement(existing_text, vision_text, VISION_SUPPLEMENT_HEADER)
}

/// Combine native text with region OCR texts.
///
/// Native text is primary. An OCR text whose whitespace-separated tokens occur
/// as a contiguous run of whole tokens in the native text adds nothing and is
/// dropped. Partial tokens never count as covered, so `"10"` survives against
/// `"100"`. The rest follow the replace-or-append policy under
/// [`OCR_SUPPLEMENT_HEADER`].
///
/// Returns the combined text, whether a supplement was appended, and the OCR
/// text that was actually used.
pub fn combine_ocr_text(native_text: &str, ocr_texts: &[String]) -> (String, bool, String) {
    let native: Vec<&str> = native_text.split_whitespace().collect();

    let novel: Vec<&str> = ocr_texts
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter(|t| !contains_token_run(&native, t))
        .collect();

    let ocr_text = novel.join("\n\n");
    let (text, applied) = supplement(native_text, &ocr_text, OCR_SUPPLEMENT_HEADER);
    (text, applied, ocr_text)
}

fn contains_token_run(haystack: &[&str], needle: &str) -> bool {
    let needle: Vec<&str> = needle.split_whitespace().collect();
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle.as_slice())
}

/// What became of the vision call for a page.
#[derive(Debug, Clone, PartialEq)]
pub enum VisionOutcome {
    /// Vision was not eligible, disabled or not configured.
    NotRequested,
    /// The call failed after retries.
    Failed(CapabilityError),
    /// Raw response text.
    Response(String),
}

/// Terminal fusion step for one page.
///
/// `tables` is the already deduplicated OCR + native list; vision tables are
/// deduplicated against it last. `char_counts` holds the counts of the
/// sources already merged into `existing_text`.
pub fn reconcile_page(
    existing_text: String,
    tables: Vec<TableBlock>,
    vision: VisionOutcome,
    mut char_counts: BTreeMap<ExtractionSource, usize>,
) -> ReconciliationResult {
    let mut result = ReconciliationResult {
        final_text: existing_text,
        ..Default::default()
    };

    let response = match vision {
        VisionOutcome::NotRequested => {
            result.table_blocks = tables;
            result.char_counts_by_source = char_counts;
            return result;
        }
        VisionOutcome::Failed(error) => {
            tracing::warn!(error = %error, "Vision transcription failed, keeping existing text");
            result.vision_failed = true;
            result.table_blocks = tables;
            result.char_counts_by_source = char_counts;
            return result;
        }
        VisionOutcome::Response(response) => response,
    };

    let payload = parse_response(&response);
    if payload.is_empty() {
        tracing::warn!("Vision transcription returned nothing usable, keeping existing text");
        result.vision_failed = true;
        result.table_blocks = tables;
        result.char_counts_by_source = char_counts;
        return result;
    }

    let vision_text = payload.text_with_notes();
    let (final_text, supplement_applied) = reconcile(&result.final_text, &vision_text);
    char_counts.insert(ExtractionSource::Vision, vision_text.trim().chars().count());

    result.final_text = final_text;
    result.supplement_applied = supplement_applied;
    result.table_blocks = dedupe(tables, payload.tables);
    result.sections = payload.sections;
    result.visual_notes = payload.visual_notes;
    result.vision_structured = payload.structured;
    result.char_counts_by_source = char_counts;
    result
}
