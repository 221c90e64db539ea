//! Page layout: geometry, line grouping, table overlap and reading order.
//!
//! The native path runs entirely through this module:
//!
//! ```text
//! words + tables -> overlap::resolve -> LineGrouper::group -> reading_order::merge
//! ```

pub mod geometry;
pub mod lines;
pub mod overlap;
pub mod reading_order;

pub use geometry::{BoundingBox, is_inside};
pub use lines::{DEFAULT_LINE_TOLERANCE, LineGrouper};
pub use overlap::{OverlapResolution, resolve, resolve_regions};
pub use reading_order::{merge, render, render_text};
