//! Region OCR path for image-bearing pages.
//!
//! - [`coordinator`]: detection, cropping, recognition and assembly of region text
//! - [`preprocess`]: crop quality scoring and the light/heavy preprocessing chains
//!
//! Detection and recognition themselves are external capabilities; see
//! [`crate::plugins`].
pub mod coordinator;
pub mod preprocess;

pub use coordinator::{CoordinatorState, RegionOcrCoordinator, RegionOcrOutcome, extract_tables};
pub use preprocess::{PreprocessChain, PreparedCrop, prepare_crop, quality_score};
