//! Per-page sequencing of the fusion pipeline.
//!
//! For each page the orchestrator:
//!
//! 1. runs the native path (overlap removal, line grouping, reading order);
//! 2. decides which extra sources the page is eligible for: image-bearing
//!    pages and pages with sparse native text get region OCR, the table
//!    engine and vision transcription, subject to configuration and
//!    capability availability;
//! 3. dispatches the selected sources concurrently and waits for all of them;
//! 4. combines text (native, then OCR supplement, then vision supplement) and
//!    tables (OCR engine, then native, then vision, deduplicated).
//!
//! Capability failures never fail a page. The worst case is native text only.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::Result;
use crate::core::config::FusionConfig;
use crate::error::{CapabilityError, CapabilityKind, VisionErrorKind};
use crate::layout::{LineGrouper, merge, render_text, resolve};
use crate::ocr::coordinator::{RegionOcrCoordinator, RegionOcrOutcome, disables_region_ocr, extract_tables};
use crate::plugins::CapabilityRegistry;
use crate::table::dedupe;
use crate::types::{ExtractionSource, ExtractionStats, PageExtraction, PageInput, PageOutput, PageStats, TableBlock};
use crate::utils::retry::{CapabilityGate, RetryPolicy};
use crate::vision::{VisionOutcome, combine_ocr_text, reconcile_page};

/// Monotonic counters across every page processed by one orchestrator.
#[derive(Debug, Default)]
pub struct FusionTelemetry {
    pages_processed: AtomicU64,
    pages_skipped: AtomicU64,
    regions_recognized: AtomicU64,
    low_confidence_regions: AtomicU64,
    vision_calls: AtomicU64,
    vision_failures: AtomicU64,
    supplements_applied: AtomicU64,
    native_chars: AtomicU64,
    ocr_chars: AtomicU64,
    vision_chars: AtomicU64,
}

/// Point-in-time copy of [`FusionTelemetry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub pages_processed: u64,
    pub pages_skipped: u64,
    pub regions_recognized: u64,
    pub low_confidence_regions: u64,
    pub vision_calls: u64,
    pub vision_failures: u64,
    pub supplements_applied: u64,
    pub native_chars: u64,
    pub ocr_chars: u64,
    pub vision_chars: u64,
    pub capability_attempts: u64,
    pub capability_retries: u64,
}

impl FusionTelemetry {
    fn record_page(&self, stats: &PageStats) {
        self.pages_processed.fetch_add(1, Ordering::Relaxed);
        self.regions_recognized
            .fetch_add(stats.regions_recognized as u64, Ordering::Relaxed);
        self.low_confidence_regions
            .fetch_add(stats.low_confidence_regions as u64, Ordering::Relaxed);
        if stats.vision_applied || stats.vision_failed {
            self.vision_calls.fetch_add(1, Ordering::Relaxed);
        }
        if stats.vision_failed {
            self.vision_failures.fetch_add(1, Ordering::Relaxed);
        }
        if stats.supplement_applied {
            self.supplements_applied.fetch_add(1, Ordering::Relaxed);
        }

        let count = |source: ExtractionSource| stats.source_char_counts.get(&source).copied().unwrap_or(0) as u64;
        self.native_chars
            .fetch_add(count(ExtractionSource::Native), Ordering::Relaxed);
        self.ocr_chars.fetch_add(count(ExtractionSource::Ocr), Ordering::Relaxed);
        self.vision_chars
            .fetch_add(count(ExtractionSource::Vision), Ordering::Relaxed);
    }

    fn snapshot(&self, gate: &CapabilityGate) -> TelemetrySnapshot {
        TelemetrySnapshot {
            pages_processed: self.pages_processed.load(Ordering::Relaxed),
            pages_skipped: self.pages_skipped.load(Ordering::Relaxed),
            regions_recognized: self.regions_recognized.load(Ordering::Relaxed),
            low_confidence_regions: self.low_confidence_regions.load(Ordering::Relaxed),
            vision_calls: self.vision_calls.load(Ordering::Relaxed),
            vision_failures: self.vision_failures.load(Ordering::Relaxed),
            supplements_applied: self.supplements_applied.load(Ordering::Relaxed),
            native_chars: self.native_chars.load(Ordering::Relaxed),
            ocr_chars: self.ocr_chars.load(Ordering::Relaxed),
            vision_chars: self.vision_chars.load(Ordering::Relaxed),
            capability_attempts: gate.attempts(),
            capability_retries: gate.retries(),
        }
    }
}

/// Result of a multi-page run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Processed pages in input order.
    pub pages: Vec<PageOutput>,
    /// Page numbers never dispatched because the deadline had passed.
    pub skipped: Vec<usize>,
}

/// Owns configuration, capabilities and the call gate for one run.
///
/// Cloning is cheap and shares all state, including the run-level disable
/// flags and telemetry.
#[derive(Debug, Clone)]
pub struct PageOrchestrator {
    config: Arc<FusionConfig>,
    registry: Arc<CapabilityRegistry>,
    gate: Arc<CapabilityGate>,
    region_permits: Arc<Semaphore>,
    telemetry: Arc<FusionTelemetry>,
}

/// Which optional sources a page gets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SourcePlan {
    region_ocr: bool,
    tables: bool,
    vision: bool,
}

impl PageOrchestrator {
    /// # Errors
    ///
    /// `FusionError::Validation` when the configuration is out of range.
    pub fn new(config: FusionConfig, registry: CapabilityRegistry) -> Result<Self> {
        config.validate()?;

        let gate = CapabilityGate::new(
            config.max_concurrent_capability_calls,
            config.capability_timeout(),
            RetryPolicy::from(&config.retry),
        );
        let region_permits = Semaphore::new(config.region_concurrency());

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            gate: Arc::new(gate),
            region_permits: Arc::new(region_permits),
            telemetry: Arc::new(FusionTelemetry::default()),
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot(&self.gate)
    }

    /// Shut down every capability plugin.
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    /// Native path for one page: drop words inside tables, group the rest into
    /// lines and merge lines with tables in reading order.
    pub fn extract_native(&self, page: &PageInput) -> PageExtraction {
        let resolution = resolve(&page.words, &page.tables);
        let lines = LineGrouper::new(self.config.line_tolerance).group(&resolution.outside);

        let stats = ExtractionStats {
            words_total: page.words.len(),
            words_in_tables: resolution.inside_count(),
            lines: lines.len(),
            tables: page.tables.len(),
            text_chars: lines.iter().map(|l| l.text.chars().count()).sum(),
        };

        PageExtraction {
            page_number: page.page_number,
            elements: merge(lines, page.tables.clone()),
            stats,
        }
    }

    fn plan_sources(&self, page: &PageInput, native_chars: usize) -> SourcePlan {
        if page.image.is_none() {
            return SourcePlan::default();
        }
        let sparse = native_chars < self.config.min_native_chars;
        if !(page.has_embedded_images || sparse) {
            return SourcePlan::default();
        }

        SourcePlan {
            region_ocr: self.config.enable_region_ocr && self.registry.hybrid_available(),
            tables: self.config.enable_table_extraction && self.registry.table_extractor().is_some(),
            vision: self.config.enable_vision && self.registry.vision_transcriber().is_some(),
        }
    }

    /// Fuse every available source for one page.
    pub async fn process_page(&self, page: PageInput) -> PageOutput {
        self.process_page_with_deadline(page, None).await
    }

    /// Like [`process_page`](Self::process_page); no region is dispatched
    /// after `deadline`.
    #[tracing::instrument(skip(self, page, deadline), fields(page = page.page_number))]
    pub async fn process_page_with_deadline(&self, page: PageInput, deadline: Option<Instant>) -> PageOutput {
        let native = self.extract_native(&page);
        let native_text = render_text(&native.elements);
        let native_chars = native_text.trim().chars().count();
        let plan = self.plan_sources(&page, native_chars);

        tracing::debug!(
            words = native.stats.words_total,
            words_in_tables = native.stats.words_in_tables,
            native_chars,
            region_ocr = plan.region_ocr,
            tables = plan.tables,
            vision = plan.vision,
            "Native extraction complete"
        );

        let (region_outcome, ocr_tables, vision) = match page.image.as_ref() {
            Some(image) => {
                tokio::join!(
                    self.run_region_ocr(plan.region_ocr, image, deadline),
                    self.run_table_extraction(plan.tables, image),
                    self.run_vision(plan.vision, image),
                )
            }
            None => (None, Vec::new(), VisionOutcome::NotRequested),
        };

        let ocr_texts = region_outcome.as_ref().map_or(&[][..], |outcome| outcome.texts.as_slice());
        let (combined_text, ocr_supplement, ocr_used) = combine_ocr_text(&native_text, ocr_texts);

        let mut char_counts = BTreeMap::new();
        char_counts.insert(ExtractionSource::Native, native_chars);
        if region_outcome.is_some() {
            char_counts.insert(ExtractionSource::Ocr, ocr_used.chars().count());
        }

        let vision_requested = !matches!(vision, VisionOutcome::NotRequested);
        let tables = dedupe(ocr_tables, page.tables);
        let mut result = reconcile_page(combined_text, tables, vision, char_counts);
        result.supplement_applied |= ocr_supplement;
        result.table_blocks.retain(|t| t.data_row_count() > 0);

        let stats = PageStats {
            source_char_counts: result.char_counts_by_source,
            regions_recognized: region_outcome.as_ref().map_or(0, |o| o.recognized),
            low_confidence_regions: region_outcome.as_ref().map_or(0, |o| o.low_confidence),
            tables_found: result.table_blocks.len(),
            vision_applied: vision_requested && !result.vision_failed,
            vision_failed: result.vision_failed,
            vision_structured: result.vision_structured,
            supplement_applied: result.supplement_applied,
            hybrid_ran: region_outcome.is_some(),
        };
        self.telemetry.record_page(&stats);

        PageOutput {
            page_number: page.page_number,
            full_text: result.final_text,
            tables: result.table_blocks,
            sections: result.sections,
            visual_notes: result.visual_notes,
            stats,
        }
    }

    async fn run_region_ocr(
        &self,
        enabled: bool,
        image: &Arc<DynamicImage>,
        deadline: Option<Instant>,
    ) -> Option<RegionOcrOutcome> {
        if !enabled {
            return None;
        }
        let detector = self.registry.region_detector()?;
        let recognizer = self.registry.text_recognizer()?;

        let coordinator = RegionOcrCoordinator::new(
            detector,
            recognizer,
            Arc::clone(&self.gate),
            Arc::clone(&self.region_permits),
            self.config.ocr.clone(),
        );

        match coordinator.run(Arc::clone(image), deadline).await {
            Ok(outcome) => Some(outcome),
            Err(e) if disables_region_ocr(&e) => {
                self.registry.disable(CapabilityKind::RegionDetector, &e.to_string());
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Region detection failed for this page");
                None
            }
        }
    }

    async fn run_table_extraction(&self, enabled: bool, image: &Arc<DynamicImage>) -> Vec<TableBlock> {
        if !enabled {
            return Vec::new();
        }
        let Some(extractor) = self.registry.table_extractor() else {
            return Vec::new();
        };

        match extract_tables(&extractor, &self.gate, image).await {
            Ok(tables) => tables,
            Err(e) => {
                tracing::warn!(error = %e, "Table extraction failed for this page");
                Vec::new()
            }
        }
    }

    async fn run_vision(&self, enabled: bool, image: &Arc<DynamicImage>) -> VisionOutcome {
        if !enabled {
            return VisionOutcome::NotRequested;
        }
        let Some(transcriber) = self.registry.vision_transcriber() else {
            return VisionOutcome::NotRequested;
        };

        let instructions = self.config.vision_instructions.as_str();
        let image = image.as_ref();
        let transcriber = &transcriber;
        match self
            .gate
            .call(CapabilityKind::VisionTranscriber, || {
                transcriber.transcribe_image(image, instructions)
            })
            .await
        {
            Ok(response) => VisionOutcome::Response(response),
            Err(e) => {
                if let CapabilityError::VisionServiceError {
                    kind: VisionErrorKind::Auth,
                    ..
                } = &e
                {
                    self.registry.disable(CapabilityKind::VisionTranscriber, &e.to_string());
                }
                VisionOutcome::Failed(e)
            }
        }
    }

    /// Process pages on a bounded worker pool.
    ///
    /// At most `max_concurrent_pages` pages run at once. Once `deadline` has
    /// passed no further page is dispatched; pages already running complete.
    /// Pages come back in input order.
    pub async fn process_pages(&self, pages: Vec<PageInput>, deadline: Option<Instant>) -> BatchOutcome {
        if pages.is_empty() {
            return BatchOutcome::default();
        }

        let semaphore = Arc::new(Semaphore::new(self.config.page_concurrency()));
        let mut tasks = JoinSet::new();
        let mut skipped = Vec::new();
        let total = pages.len();

        let mut pending = pages.into_iter().enumerate();
        for (index, page) in pending.by_ref() {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                skipped.push(page.page_number);
                break;
            };
            if deadline.is_some_and(|d| Instant::now() >= d) {
                skipped.push(page.page_number);
                break;
            }

            let orchestrator = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let output = orchestrator.process_page_with_deadline(page, deadline).await;
                (index, output)
            });
        }
        skipped.extend(pending.map(|(_, page)| page.page_number));

        if !skipped.is_empty() {
            tracing::warn!(skipped = skipped.len(), total, "Deadline reached, remaining pages not dispatched");
            self.telemetry
                .pages_skipped
                .fetch_add(skipped.len() as u64, Ordering::Relaxed);
        }

        let mut results: Vec<Option<PageOutput>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, output)) => results[index] = Some(output),
                Err(e) => tracing::error!(error = %e, "Page task failed"),
            }
        }

        BatchOutcome {
            pages: results.into_iter().flatten().collect(),
            skipped,
        }
    }
}
