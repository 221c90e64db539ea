//! Error types for pagefuse.
//!
//! Two layers of errors exist:
//!
//! - [`CapabilityError`] describes a failed call into one of the external
//!   capabilities (region detector, text recognizer, table engine, vision
//!   service). These are caught at the smallest scope that produced them
//!   (one region, one page, one table call) and never abort page processing.
//! - [`FusionError`] is the crate-level error returned by the few public
//!   operations that can fail outright: configuration loading/validation and
//!   plugin registration.
//!
//! # Example
//!
//! ```rust
//! use pagefuse::{FusionError, Result};
//!
//! fn check_tolerance(tolerance: f64) -> Result<f64> {
//!     if !(tolerance >= 0.0) {
//!         return Err(FusionError::validation(format!(
//!             "line tolerance must be non-negative, got {}",
//!             tolerance
//!         )));
//!     }
//!     Ok(tolerance)
//! }
//! ```
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using `FusionError`.
pub type Result<T> = std::result::Result<T, FusionError>;

/// Result of a single external capability call.
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

/// Main error type for pagefuse operations.
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Image processing error: {message}")]
    ImageProcessing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("Plugin error in '{plugin_name}': {message}")]
    Plugin { message: String, plugin_name: String },

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for FusionError {
    fn from(err: serde_json::Error) -> Self {
        FusionError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<image::ImageError> for FusionError {
    fn from(err: image::ImageError) -> Self {
        FusionError::ImageProcessing {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

macro_rules! error_constructor {
    ($name:ident, $variant:ident) => {
        pastey::paste! {
            #[doc = "Create a " $variant " error"]
            pub fn $name<S: Into<String>>(message: S) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: None,
                }
            }

            #[doc = "Create a " $variant " error with source"]
            pub fn [<$name _with_source>]<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
                message: S,
                source: E,
            ) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: Some(Box::new(source)),
                }
            }
        }
    };
}

impl FusionError {
    error_constructor!(validation, Validation);
    error_constructor!(image_processing, ImageProcessing);
    error_constructor!(serialization, Serialization);
}

/// The external capability a call was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    RegionDetector,
    TextRecognizer,
    TableExtractor,
    VisionTranscriber,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RegionDetector => "region detector",
            Self::TextRecognizer => "text recognizer",
            Self::TableExtractor => "table extractor",
            Self::VisionTranscriber => "vision transcriber",
        };
        f.write_str(name)
    }
}

/// Sub-kinds of vision service failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionErrorKind {
    /// Provider throttled the request (HTTP 429 or equivalent).
    RateLimited,
    /// The response could not be used at all.
    MalformedResponse,
    /// Credentials rejected.
    Auth,
    /// The request itself was invalid (oversized image, bad parameters).
    BadRequest,
    /// Provider-side failure (5xx, overloaded).
    ServerError,
}

impl fmt::Display for VisionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RateLimited => "rate limited",
            Self::MalformedResponse => "malformed response",
            Self::Auth => "authentication",
            Self::BadRequest => "bad request",
            Self::ServerError => "server error",
        };
        f.write_str(name)
    }
}

/// Failure of a single external capability call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CapabilityError {
    #[error("region detector unavailable")]
    DetectorUnavailable,

    #[error("region detection failed: {0}")]
    DetectorError(String),

    #[error("text recognition failed: {0}")]
    RecognizerError(String),

    #[error("table extraction failed: {0}")]
    TableEngineError(String),

    #[error("vision service error ({kind}): {message}")]
    VisionServiceError { kind: VisionErrorKind, message: String },

    #[error("{capability} call timed out after {elapsed:?}")]
    Timeout { capability: CapabilityKind, elapsed: Duration },

    /// A transient failure reported by the provider (connection reset, busy).
    #[error("{capability} temporarily unavailable: {message}")]
    Transient { capability: CapabilityKind, message: String },
}

impl CapabilityError {
    /// Whether a retry with backoff may succeed.
    ///
    /// Only timeouts, transient failures, rate limits and provider-side errors
    /// are retried. Bad input, auth and malformed responses fail immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transient { .. } => true,
            Self::VisionServiceError { kind, .. } => {
                matches!(kind, VisionErrorKind::RateLimited | VisionErrorKind::ServerError)
            }
            Self::DetectorUnavailable
            | Self::DetectorError(_)
            | Self::RecognizerError(_)
            | Self::TableEngineError(_) => false,
        }
    }

    /// Whether this failure means the capability is unusable for the rest of the run.
    pub fn disables_capability(&self) -> bool {
        matches!(self, Self::DetectorUnavailable | Self::DetectorError(_))
    }

    pub fn vision<S: Into<String>>(kind: VisionErrorKind, message: S) -> Self {
        Self::VisionServiceError {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FusionError = io_err.into();
        assert!(matches!(err, FusionError::Io(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_validation_error() {
        let err = FusionError::validation("invalid input");
        assert_eq!(err.to_string(), "Validation error: invalid input");
    }

    #[test]
    fn test_validation_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad param");
        let err = FusionError::validation_with_source("invalid input", source);
        assert_eq!(err.to_string(), "Validation error: invalid input");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_image_processing_error() {
        let err = FusionError::image_processing("crop failed");
        assert_eq!(err.to_string(), "Image processing error: crop failed");
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: FusionError = json_err.into();
        assert!(matches!(err, FusionError::Serialization { .. }));
    }

    #[test]
    fn test_capability_error_is_transparent() {
        let err: FusionError = CapabilityError::DetectorUnavailable.into();
        assert_eq!(err.to_string(), "region detector unavailable");
    }

    #[test]
    fn test_plugin_error() {
        let err = FusionError::Plugin {
            message: "initialization failed".to_string(),
            plugin_name: "mock-detector".to_string(),
        };
        assert_eq!(err.to_string(), "Plugin error in 'mock-detector': initialization failed");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            CapabilityError::Timeout {
                capability: CapabilityKind::TextRecognizer,
                elapsed: Duration::from_secs(1),
            }
            .is_retryable()
        );
        assert!(CapabilityError::vision(VisionErrorKind::RateLimited, "429").is_retryable());
        assert!(CapabilityError::vision(VisionErrorKind::ServerError, "503").is_retryable());
        assert!(!CapabilityError::vision(VisionErrorKind::Auth, "401").is_retryable());
        assert!(!CapabilityError::vision(VisionErrorKind::BadRequest, "400").is_retryable());
        assert!(!CapabilityError::vision(VisionErrorKind::MalformedResponse, "???").is_retryable());
        assert!(!CapabilityError::RecognizerError("blank crop".into()).is_retryable());
        assert!(!CapabilityError::DetectorUnavailable.is_retryable());
    }

    #[test]
    fn test_detector_failures_disable_capability() {
        assert!(CapabilityError::DetectorUnavailable.disables_capability());
        assert!(CapabilityError::DetectorError("model missing".into()).disables_capability());
        assert!(!CapabilityError::RecognizerError("x".into()).disables_capability());
        assert!(
            !CapabilityError::Timeout {
                capability: CapabilityKind::RegionDetector,
                elapsed: Duration::from_millis(5),
            }
            .disables_capability()
        );
    }
}
