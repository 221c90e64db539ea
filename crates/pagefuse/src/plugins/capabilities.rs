//! External capability traits.
//!
//! The engine never implements detection, recognition, table structure or
//! vision transcription itself. Providers implement these traits and are
//! handed to the engine through a [`CapabilityRegistry`](super::CapabilityRegistry).
//!
//! Calls may block for a long time, time out or fail; the engine wraps every
//! call in its call gate (admission semaphore, timeout, retry) and degrades
//! per page or per region on failure.

use async_trait::async_trait;
use image::DynamicImage;

use crate::error::CapabilityResult;
use crate::layout::geometry::BoundingBox;
use crate::plugins::Plugin;
use crate::types::{Recognition, TableBlock};

/// Locates text regions on a page image.
#[async_trait]
pub trait RegionDetector: Plugin {
    /// Candidate text regions in the coordinate space of `image`.
    ///
    /// # Errors
    ///
    /// `DetectorUnavailable` when the model cannot be used at all,
    /// `DetectorError` for any other failure. Both disable region OCR for the
    /// rest of the run.
    async fn detect_regions(&self, image: &DynamicImage) -> CapabilityResult<Vec<BoundingBox>>;
}

/// Converts an image crop into text.
#[async_trait]
pub trait TextRecognizer: Plugin {
    /// # Errors
    ///
    /// `RecognizerError` for a failed crop. Only that region is affected.
    async fn recognize_text(&self, crop: &DynamicImage) -> CapabilityResult<Recognition>;
}

/// Table-structure engine run directly on a page image.
#[async_trait]
pub trait TableExtractor: Plugin {
    /// Tables found on the page; returned blocks should carry `source: Ocr`.
    async fn extract_tables(&self, image: &DynamicImage) -> CapabilityResult<Vec<TableBlock>>;
}

/// Vision-language transcription service.
#[async_trait]
pub trait VisionTranscriber: Plugin {
    /// Raw response text for `image`.
    ///
    /// The engine parses the response itself and tolerates prose, fenced
    /// blocks and damaged JSON, so providers return the model output as is.
    async fn transcribe_image(&self, image: &DynamicImage, instructions: &str) -> CapabilityResult<String>;
}
