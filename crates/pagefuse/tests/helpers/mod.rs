//! Shared mock capabilities and page builders for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use pagefuse::error::CapabilityResult;
use pagefuse::plugins::{Plugin, RegionDetector, TableExtractor, TextRecognizer, VisionTranscriber};
use pagefuse::{BoundingBox, CapabilityError, ExtractionSource, FusionConfig, Recognition, RetryConfig, TableBlock, Word};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

macro_rules! impl_plugin {
    ($ty:ty, $name:expr) => {
        impl Plugin for $ty {
            fn name(&self) -> &str {
                $name
            }
            fn version(&self) -> String {
                "1.0.0".to_string()
            }
            fn initialize(&self) -> pagefuse::Result<()> {
                Ok(())
            }
            fn shutdown(&self) -> pagefuse::Result<()> {
                Ok(())
            }
        }
    };
}

/// Returns a fixed set of regions, or a fixed error.
pub struct MockDetector {
    result: CapabilityResult<Vec<BoundingBox>>,
    calls: AtomicUsize,
}

impl MockDetector {
    pub fn with_regions(regions: Vec<BoundingBox>) -> Self {
        Self {
            result: Ok(regions),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl_plugin!(MockDetector, "mock-detector");

#[async_trait]
impl RegionDetector for MockDetector {
    async fn detect_regions(&self, _image: &DynamicImage) -> CapabilityResult<Vec<BoundingBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Maps crop width to a recognition. Unknown widths recognize as empty text.
pub struct WidthRecognizer {
    by_width: Vec<(u32, Recognition)>,
    calls: AtomicUsize,
}

impl WidthRecognizer {
    pub fn new(by_width: Vec<(u32, &str, f64)>) -> Self {
        Self {
            by_width: by_width
                .into_iter()
                .map(|(width, text, confidence)| (width, Recognition::new(text, confidence)))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl_plugin!(WidthRecognizer, "width-recognizer");

#[async_trait]
impl TextRecognizer for WidthRecognizer {
    async fn recognize_text(&self, crop: &DynamicImage) -> CapabilityResult<Recognition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .by_width
            .iter()
            .find(|(width, _)| *width == crop.width())
            .map(|(_, recognition)| recognition.clone())
            .unwrap_or_else(Recognition::empty))
    }
}

/// Holds each recognition for `delay` and records the peak number in flight.
pub struct SlowRecognizer {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowRecognizer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl_plugin!(SlowRecognizer, "slow-recognizer");

#[async_trait]
impl TextRecognizer for SlowRecognizer {
    async fn recognize_text(&self, crop: &DynamicImage) -> CapabilityResult<Recognition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Recognition::new(format!("region {}", crop.width()), 0.9))
    }
}

pub struct MockTableExtractor {
    result: CapabilityResult<Vec<TableBlock>>,
    calls: AtomicUsize,
}

impl MockTableExtractor {
    pub fn with_tables(tables: Vec<TableBlock>) -> Self {
        Self {
            result: Ok(tables),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl_plugin!(MockTableExtractor, "mock-table-extractor");

#[async_trait]
impl TableExtractor for MockTableExtractor {
    async fn extract_tables(&self, _image: &DynamicImage) -> CapabilityResult<Vec<TableBlock>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Fails the first `failures` calls with `error`, then answers with `response`.
pub struct MockVision {
    response: String,
    error: Option<CapabilityError>,
    failures: usize,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockVision {
    pub fn responding(response: &str) -> Self {
        Self {
            response: response.to_string(),
            error: None,
            failures: 0,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self::responding("").fail_first(usize::MAX, error)
    }

    pub fn fail_first(mut self, failures: usize, error: CapabilityError) -> Self {
        self.failures = failures;
        self.error = Some(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl_plugin!(MockVision, "mock-vision");

#[async_trait]
impl VisionTranscriber for MockVision {
    async fn transcribe_image(&self, _image: &DynamicImage, _instructions: &str) -> CapabilityResult<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.error {
            Some(error) if call < self.failures => Err(error.clone()),
            _ => Ok(self.response.clone()),
        }
    }
}

/// Route engine logs to the test writer. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A page image with enough texture to pass the crop quality check.
pub fn page_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            Rgb([20, 20, 20])
        } else {
            Rgb([235, 235, 235])
        }
    }))
}

pub fn word(text: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Word {
    Word::new(text, BoundingBox::new(x0, y0, x1, y1))
}

pub fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
}

pub fn table(rows: &[&[&str]], source: ExtractionSource) -> TableBlock {
    TableBlock::new(BoundingBox::new(0.0, 40.0, 200.0, 80.0), grid(rows), source)
}

/// Defaults with millisecond backoff so retry tests stay fast.
pub fn fast_config() -> FusionConfig {
    FusionConfig {
        capability_timeout_secs: 5,
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            backoff_multiplier: 2.0,
        },
        ..FusionConfig::default()
    }
}
