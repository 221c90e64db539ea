//! Table normalization, rendering and cross-source deduplication.

pub mod dedupe;
pub mod normalize;

pub use dedupe::{canonical_key, dedupe};
pub use normalize::{RawTable, cell_to_string, grid_width, normalize, render_markdown};
