//! pagefuse - Document Layout Fusion Engine
//!
//! pagefuse turns a page into reading-order text plus a deduplicated list of
//! tables by fusing up to three sources:
//!
//! - the document's native text layer (positioned words and tables)
//! - region OCR on the page image (detect, crop, recognize)
//! - a vision-language transcription of the page image
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pagefuse::{BoundingBox, CapabilityRegistry, FusionConfig, PageInput, PageOrchestrator, Word};
//!
//! # async fn example() -> pagefuse::Result<()> {
//! let orchestrator = PageOrchestrator::new(FusionConfig::default(), CapabilityRegistry::empty())?;
//! let page = PageInput::new(1).with_words(vec![
//!     Word::new("Invoice", BoundingBox::new(0.0, 0.0, 40.0, 10.0)),
//!     Word::new("42", BoundingBox::new(45.0, 1.0, 60.0, 11.0)),
//! ]);
//!
//! let output = orchestrator.process_page(page).await;
//! assert_eq!(output.full_text, "Invoice 42");
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Layout** (`layout`): geometry, line grouping, table overlap, reading order
//! - **Tables** (`table`): normalization of heterogeneous table shapes, markdown rendering, deduplication
//! - **OCR** (`ocr`): region OCR coordination and crop preprocessing
//! - **Vision** (`vision`): tolerant response parsing and replace-or-append reconciliation
//! - **Plugins** (`plugins`): capability traits and the registry
//! - **Core** (`core`): configuration and the per-page orchestrator

#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod layout;
pub mod ocr;
pub mod plugins;
pub mod table;
pub mod types;
pub mod utils;
pub mod vision;

pub use error::{CapabilityError, CapabilityKind, CapabilityResult, FusionError, Result, VisionErrorKind};
pub use types::*;

pub use core::config::{FusionConfig, RegionOcrConfig, RetryConfig};
pub use core::orchestrator::{BatchOutcome, PageOrchestrator, TelemetrySnapshot};
pub use layout::BoundingBox;
pub use plugins::{CapabilityRegistry, Plugin, RegionDetector, TableExtractor, TextRecognizer, VisionTranscriber};
