//! Configuration and per-page orchestration.
//!
//! # Example
//!
//! ```rust,no_run
//! use pagefuse::core::config::FusionConfig;
//! use pagefuse::core::orchestrator::PageOrchestrator;
//! use pagefuse::plugins::CapabilityRegistry;
//! use pagefuse::types::PageInput;
//!
//! # async fn example() -> pagefuse::Result<()> {
//! let config = FusionConfig::discover()?.unwrap_or_default();
//! let orchestrator = PageOrchestrator::new(config, CapabilityRegistry::empty())?;
//! let output = orchestrator.process_page(PageInput::new(1)).await;
//! println!("{}", output.to_markdown());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod orchestrator;

pub use config::{FusionConfig, RegionOcrConfig, RetryConfig};
pub use orchestrator::{BatchOutcome, FusionTelemetry, PageOrchestrator, TelemetrySnapshot};
