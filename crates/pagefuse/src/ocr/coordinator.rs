//! Region OCR over one page image.
//!
//! The coordinator walks a fixed sequence of states:
//!
//! ```text
//! Idle -> LayoutDetected -> Cropped -> Recognized -> Reconciled
//! ```
//!
//! Detection runs on a downscaled copy; crops are always cut from the
//! original image. A failing region yields an empty, zero-confidence result
//! and never aborts the page. A failing detector is returned to the caller,
//! which decides whether to disable region OCR for the run.

use std::cmp::Ordering;
use std::sync::Arc;

use image::DynamicImage;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::preprocess::{self, PreprocessChain};
use crate::core::config::RegionOcrConfig;
use crate::error::{CapabilityError, CapabilityKind, CapabilityResult};
use crate::layout::geometry::BoundingBox;
use crate::plugins::{RegionDetector, TableExtractor, TextRecognizer};
use crate::types::{ExtractionSource, OcrRegion, Recognition, TableBlock};
use crate::utils::retry::CapabilityGate;

/// Progress of one coordinator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CoordinatorState {
    Idle,
    LayoutDetected,
    Cropped,
    Recognized,
    Reconciled,
}

/// Result of region OCR for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOcrOutcome {
    /// Every dispatched region in `(top, left)` order, failed ones included
    /// with empty text and zero confidence.
    pub regions: Vec<OcrRegion>,
    /// Non-empty region texts in the same order as `regions`.
    pub texts: Vec<String>,
    /// Regions whose recognition succeeded.
    pub recognized: usize,
    /// Recognized regions below the low-confidence threshold.
    pub low_confidence: usize,
    /// Regions whose recognition call failed.
    pub failed: usize,
    /// Regions never dispatched: zero-area after clamping, or past the deadline.
    pub skipped: usize,
    pub state: CoordinatorState,
}

impl RegionOcrOutcome {
    fn empty() -> Self {
        Self {
            regions: Vec::new(),
            texts: Vec::new(),
            recognized: 0,
            low_confidence: 0,
            failed: 0,
            skipped: 0,
            state: CoordinatorState::Idle,
        }
    }
}

struct RecognizedRegion {
    bbox: BoundingBox,
    recognition: Recognition,
    failed: bool,
}

/// Drives detection, cropping, preprocessing and recognition for one image.
pub struct RegionOcrCoordinator {
    detector: Arc<dyn RegionDetector>,
    recognizer: Arc<dyn TextRecognizer>,
    gate: Arc<CapabilityGate>,
    region_permits: Arc<Semaphore>,
    config: RegionOcrConfig,
}

impl RegionOcrCoordinator {
    /// `region_permits` is shared across pages so the bound on in-flight
    /// recognitions holds for the whole run.
    pub fn new(
        detector: Arc<dyn RegionDetector>,
        recognizer: Arc<dyn TextRecognizer>,
        gate: Arc<CapabilityGate>,
        region_permits: Arc<Semaphore>,
        config: RegionOcrConfig,
    ) -> Self {
        Self {
            detector,
            recognizer,
            gate,
            region_permits,
            config,
        }
    }

    /// Run every state transition for `image`.
    ///
    /// # Errors
    ///
    /// Only detector failures are returned. Recognition failures are folded
    /// into the outcome.
    pub async fn run(&self, image: Arc<DynamicImage>, deadline: Option<Instant>) -> CapabilityResult<RegionOcrOutcome> {
        let mut outcome = RegionOcrOutcome::empty();

        let detected = self.detect(&image).await?;
        outcome.state = CoordinatorState::LayoutDetected;
        tracing::debug!(regions = detected.len(), "Layout detected");

        let crops = self.plan_crops(&image, detected, &mut outcome);
        outcome.state = CoordinatorState::Cropped;

        let recognized = self.recognize(image, crops, deadline, &mut outcome).await;
        outcome.state = CoordinatorState::Recognized;

        reconcile(recognized, self.config.low_confidence_threshold, &mut outcome);
        outcome.state = CoordinatorState::Reconciled;

        Ok(outcome)
    }

    /// Idle -> LayoutDetected. Boxes come back in original-image coordinates.
    async fn detect(&self, image: &DynamicImage) -> CapabilityResult<Vec<BoundingBox>> {
        let downscaled = preprocess::downscale_for_detection(image, self.config.detection_max_dimension);
        let (detection_image, factor) = match &downscaled {
            Some((small, factor)) => (small, *factor),
            None => (image, 1.0),
        };

        let detector = &self.detector;
        let boxes = self
            .gate
            .call(CapabilityKind::RegionDetector, || detector.detect_regions(detection_image))
            .await?;

        if factor == 1.0 {
            Ok(boxes)
        } else {
            Ok(boxes.iter().map(|b| b.scale(factor)).collect())
        }
    }

    /// LayoutDetected -> Cropped. Clamp to the image; drop what has no area.
    fn plan_crops(&self, image: &DynamicImage, boxes: Vec<BoundingBox>, outcome: &mut RegionOcrOutcome) -> Vec<BoundingBox> {
        let (width, height) = (image.width() as f64, image.height() as f64);
        let mut crops = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            match bbox.clamp_to(width, height) {
                Some(clamped) => crops.push(clamped),
                None => {
                    tracing::debug!(?bbox, "Skipping region outside image or with zero area");
                    outcome.skipped += 1;
                }
            }
        }
        crops
    }

    /// Cropped -> Recognized.
    ///
    /// Dispatch is bounded by the shared region semaphore. Once `deadline`
    /// has passed no further region is dispatched; in-flight ones finish.
    async fn recognize(
        &self,
        image: Arc<DynamicImage>,
        crops: Vec<BoundingBox>,
        deadline: Option<Instant>,
        outcome: &mut RegionOcrOutcome,
    ) -> Vec<RecognizedRegion> {
        let total = crops.len();
        let mut tasks: JoinSet<RecognizedRegion> = JoinSet::new();
        let mut dispatched = 0usize;

        for bbox in crops {
            let Ok(permit) = Arc::clone(&self.region_permits).acquire_owned().await else {
                break;
            };
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::debug!(remaining = total - dispatched, "Deadline reached, no further regions dispatched");
                break;
            }

            let image = Arc::clone(&image);
            let recognizer = Arc::clone(&self.recognizer);
            let gate = Arc::clone(&self.gate);
            let threshold = self.config.quality_threshold;
            dispatched += 1;

            tasks.spawn(async move {
                let _permit = permit;
                recognize_region(image, bbox, recognizer, gate, threshold).await
            });
        }
        outcome.skipped += total - dispatched;

        let mut recognized = Vec::with_capacity(dispatched);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(region) => recognized.push(region),
                Err(e) => {
                    tracing::warn!(error = %e, "Region recognition task failed");
                    outcome.failed += 1;
                }
            }
        }
        recognized
    }
}

async fn recognize_region(
    image: Arc<DynamicImage>,
    bbox: BoundingBox,
    recognizer: Arc<dyn TextRecognizer>,
    gate: Arc<CapabilityGate>,
    quality_threshold: f64,
) -> RecognizedRegion {
    let prepared = tokio::task::spawn_blocking(move || {
        preprocess::crop_region(&image, &bbox).map(|crop| preprocess::prepare_crop(&crop, quality_threshold))
    })
    .await;

    let prepared = match prepared {
        Ok(Some(prepared)) => prepared,
        Ok(None) => {
            return RecognizedRegion {
                bbox,
                recognition: Recognition::empty(),
                failed: true,
            };
        }
        Err(e) => {
            tracing::warn!(?bbox, error = %e, "Crop preprocessing failed");
            return RecognizedRegion {
                bbox,
                recognition: Recognition::empty(),
                failed: true,
            };
        }
    };

    if prepared.chain == PreprocessChain::Heavy {
        tracing::trace!(?bbox, quality = prepared.quality, "Low-quality crop, heavy preprocessing applied");
    }

    let crop = &prepared.image;
    let recognizer = &recognizer;
    match gate
        .call(CapabilityKind::TextRecognizer, || recognizer.recognize_text(crop))
        .await
    {
        Ok(recognition) => RecognizedRegion {
            bbox,
            recognition: Recognition::new(recognition.text.trim(), recognition.confidence),
            failed: false,
        },
        Err(e) => {
            tracing::warn!(?bbox, error = %e, "Region recognition failed, region left empty");
            RecognizedRegion {
                bbox,
                recognition: Recognition::empty(),
                failed: true,
            }
        }
    }
}

/// Recognized -> Reconciled. Sort by `(top, left)` and assemble text.
fn reconcile(mut recognized: Vec<RecognizedRegion>, low_confidence_threshold: f64, outcome: &mut RegionOcrOutcome) {
    recognized.sort_by(|a, b| {
        a.bbox
            .top()
            .partial_cmp(&b.bbox.top())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.bbox.left().partial_cmp(&b.bbox.left()).unwrap_or(Ordering::Equal))
    });

    let mut texts = Vec::new();
    for region in &recognized {
        if region.failed {
            outcome.failed += 1;
            continue;
        }
        outcome.recognized += 1;
        if region.recognition.confidence < low_confidence_threshold {
            outcome.low_confidence += 1;
        }
        if !region.recognition.text.is_empty() {
            texts.push(region.recognition.text.clone());
        }
    }

    outcome.texts = texts;
    outcome.regions = recognized
        .into_iter()
        .map(|r| OcrRegion {
            bbox: r.bbox,
            text: r.recognition.text,
            confidence: r.recognition.confidence,
        })
        .collect();
}

/// Run the table-structure engine on a page image.
///
/// Independent of region detection. Returned tables are marked
/// [`ExtractionSource::Ocr`].
pub async fn extract_tables(
    extractor: &Arc<dyn TableExtractor>,
    gate: &CapabilityGate,
    image: &DynamicImage,
) -> CapabilityResult<Vec<TableBlock>> {
    let tables = gate
        .call(CapabilityKind::TableExtractor, || extractor.extract_tables(image))
        .await?;

    Ok(tables
        .into_iter()
        .map(|mut table| {
            table.source = ExtractionSource::Ocr;
            table
        })
        .collect())
}

/// True when `error` should switch region OCR off for the rest of the run.
pub fn disables_region_ocr(error: &CapabilityError) -> bool {
    error.disables_capability()
}
