//! Plugin system for external capabilities.
//!
//! pagefuse calls four kinds of external providers:
//!
//! - [`RegionDetector`]: text-region detection on page images
//! - [`TextRecognizer`]: character recognition on region crops
//! - [`TableExtractor`]: table-structure recognition on page images
//! - [`VisionTranscriber`]: vision-language transcription, the last-resort enrichment
//!
//! All of them extend [`Plugin`] and are collected in a [`CapabilityRegistry`]
//! that the orchestrator owns for its lifetime.
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use image::DynamicImage;
//! use pagefuse::error::CapabilityResult;
//! use pagefuse::plugins::{CapabilityRegistry, Plugin, TextRecognizer};
//! use pagefuse::{Recognition, Result};
//! use std::sync::Arc;
//!
//! struct EchoRecognizer;
//!
//! impl Plugin for EchoRecognizer {
//!     fn name(&self) -> &str { "echo-recognizer" }
//!     fn version(&self) -> String { "1.0.0".to_string() }
//!     fn initialize(&self) -> Result<()> { Ok(()) }
//!     fn shutdown(&self) -> Result<()> { Ok(()) }
//! }
//!
//! #[async_trait]
//! impl TextRecognizer for EchoRecognizer {
//!     async fn recognize_text(&self, crop: &DynamicImage) -> CapabilityResult<Recognition> {
//!         Ok(Recognition::new(format!("{}x{}", crop.width(), crop.height()), 1.0))
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let registry = CapabilityRegistry::builder()
//!     .text_recognizer(Arc::new(EchoRecognizer))
//!     .build()?;
//! assert!(registry.text_recognizer().is_some());
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod registry;
pub mod traits;

pub use capabilities::{RegionDetector, TableExtractor, TextRecognizer, VisionTranscriber};
pub use registry::{CapabilityRegistry, CapabilityRegistryBuilder};
pub use traits::Plugin;
