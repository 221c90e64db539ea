//! Configuration loading and management.
//!
//! [`FusionConfig`] can be built programmatically, loaded from TOML, YAML or
//! JSON, or discovered as `pagefuse.toml` in the current directory or one of
//! its parents. Every field has a default, so partial files are fine.

use crate::{FusionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "pagefuse.toml";

/// Main fusion configuration.
///
/// # Example
///
/// ```rust
/// use pagefuse::core::config::FusionConfig;
///
/// let config = FusionConfig::default();
/// assert_eq!(config.line_tolerance, 3.0);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Vertical tolerance for grouping words into lines, in page units.
    #[serde(default = "default_line_tolerance")]
    pub line_tolerance: f64,

    /// Pages with fewer native text characters than this are treated as sparse
    /// and become eligible for region OCR and vision.
    #[serde(default = "default_min_native_chars")]
    pub min_native_chars: usize,

    /// Run region detection + recognition on eligible pages.
    #[serde(default = "default_true")]
    pub enable_region_ocr: bool,

    /// Run the table-structure engine on eligible pages.
    #[serde(default = "default_true")]
    pub enable_table_extraction: bool,

    /// Call the vision transcriber on eligible pages.
    #[serde(default = "default_true")]
    pub enable_vision: bool,

    /// Instructions sent with every vision transcription request.
    #[serde(default = "default_vision_instructions")]
    pub vision_instructions: String,

    /// Region OCR tuning.
    #[serde(default)]
    pub ocr: RegionOcrConfig,

    /// Pages processed concurrently by `process_pages`. `None` uses the CPU count.
    #[serde(default)]
    pub max_concurrent_pages: Option<usize>,

    /// Capability calls allowed in flight at once across all pages.
    #[serde(default = "default_max_concurrent_capability_calls")]
    pub max_concurrent_capability_calls: usize,

    /// Timeout for a single capability call attempt.
    #[serde(default = "default_capability_timeout_secs")]
    pub capability_timeout_secs: u64,

    /// Backoff for retryable capability failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Region OCR configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionOcrConfig {
    /// Longer side of the copy handed to the region detector, in pixels.
    #[serde(default = "default_detection_max_dimension")]
    pub detection_max_dimension: u32,

    /// Crops scoring below this get the heavy preprocessing chain.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,

    /// Regions recognized below this confidence are counted in stats.
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,

    /// Regions recognized concurrently per run. `None` uses the CPU count.
    #[serde(default)]
    pub max_concurrent_regions: Option<usize>,
}

/// Retry configuration for capability calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_true() -> bool {
    true
}
fn default_line_tolerance() -> f64 {
    crate::layout::DEFAULT_LINE_TOLERANCE
}
fn default_min_native_chars() -> usize {
    50
}
fn default_vision_instructions() -> String {
    "Transcribe all text on this page in reading order. Respond with a JSON object with the keys \
     \"full_text\" (string), \"sections\" (array of {\"heading\", \"content\"}), \"tables\" (array of \
     {\"headers\", \"rows\", \"caption\"}) and \"visual_notes\" (array of strings describing figures, \
     stamps, signatures or handwriting)."
        .to_string()
}
fn default_max_concurrent_capability_calls() -> usize {
    8
}
fn default_capability_timeout_secs() -> u64 {
    60
}
fn default_detection_max_dimension() -> u32 {
    2000
}
fn default_quality_threshold() -> f64 {
    0.35
}
fn default_low_confidence_threshold() -> f64 {
    0.5
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    200
}
fn default_max_backoff_ms() -> u64 {
    5_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            line_tolerance: default_line_tolerance(),
            min_native_chars: default_min_native_chars(),
            enable_region_ocr: true,
            enable_table_extraction: true,
            enable_vision: true,
            vision_instructions: default_vision_instructions(),
            ocr: RegionOcrConfig::default(),
            max_concurrent_pages: None,
            max_concurrent_capability_calls: default_max_concurrent_capability_calls(),
            capability_timeout_secs: default_capability_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RegionOcrConfig {
    fn default() -> Self {
        Self {
            detection_max_dimension: default_detection_max_dimension(),
            quality_threshold: default_quality_threshold(),
            low_confidence_threshold: default_low_confidence_threshold(),
            max_concurrent_regions: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(FusionError::validation(format!("{} must be within [0, 1], got {}", name, value)));
    }
    Ok(())
}

impl FusionConfig {
    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `FusionError::Validation` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !self.line_tolerance.is_finite() || self.line_tolerance < 0.0 {
            return Err(FusionError::validation(format!(
                "line_tolerance must be a non-negative number, got {}",
                self.line_tolerance
            )));
        }
        check_unit_interval("ocr.quality_threshold", self.ocr.quality_threshold)?;
        check_unit_interval("ocr.low_confidence_threshold", self.ocr.low_confidence_threshold)?;
        if self.ocr.detection_max_dimension == 0 {
            return Err(FusionError::validation("ocr.detection_max_dimension must be positive"));
        }
        if self.ocr.max_concurrent_regions == Some(0) {
            return Err(FusionError::validation("ocr.max_concurrent_regions must be positive"));
        }
        if self.max_concurrent_pages == Some(0) {
            return Err(FusionError::validation("max_concurrent_pages must be positive"));
        }
        if self.max_concurrent_capability_calls == 0 {
            return Err(FusionError::validation("max_concurrent_capability_calls must be positive"));
        }
        if self.capability_timeout_secs == 0 {
            return Err(FusionError::validation("capability_timeout_secs must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(FusionError::validation("retry.max_attempts must be at least 1"));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(FusionError::validation(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(FusionError::validation(
                "retry.max_backoff_ms must not be smaller than retry.initial_backoff_ms",
            ));
        }
        Ok(())
    }

    pub fn page_concurrency(&self) -> usize {
        self.max_concurrent_pages.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn region_concurrency(&self) -> usize {
        self.ocr.max_concurrent_regions.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `FusionError::Validation` if the file cannot be read, is not
    /// valid TOML, or holds out-of-range values.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| FusionError::validation(format!("Invalid TOML in {}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        let config: Self = serde_yaml_ng::from_str(&content)
            .map_err(|e| FusionError::validation(format!("Invalid YAML in {}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| FusionError::validation(format!("Invalid JSON in {}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, choosing the format from the file extension.
    ///
    /// `.toml`, `.yaml`/`.yml` and `.json` are recognized.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "toml" => Self::from_toml_file(path),
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            other => Err(FusionError::validation(format!(
                "Unsupported config file extension '{}' for {}",
                other,
                path.display()
            ))),
        }
    }

    /// Discover `pagefuse.toml` in the current directory or its parents.
    ///
    /// # Returns
    ///
    /// - `Some(config)` if found
    /// - `None` if no config file found
    pub fn discover() -> Result<Option<Self>> {
        let mut current = std::env::current_dir().map_err(FusionError::Io)?;

        loop {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "Discovered configuration file");
                return Ok(Some(Self::from_toml_file(candidate)?));
            }

            if let Some(parent) = current.parent() {
                current = parent.to_path_buf();
            } else {
                break;
            }
        }

        Ok(None)
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| FusionError::validation(format!("Failed to read config file {}: {}", path.display(), e)))
}
