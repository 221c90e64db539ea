//! Vision transcription fallback: response parsing and text reconciliation.
pub mod parser;
pub mod reconcile;

pub use parser::{ParseStrategy, VisionPayload, parse_response};
pub use reconcile::{
    OCR_SUPPLEMENT_HEADER, VISION_SUPPLEMENT_HEADER, VisionOutcome, combine_ocr_text, reconcile, reconcile_page,
    supplement,
};
