//! Removal of free-text words that belong to a table.
//!
//! Table cell text is extracted independently of the page's word stream, so
//! words lying inside a table region would otherwise appear twice: once as
//! free text, once in the rendered table.

use super::geometry::{BoundingBox, is_inside};
use crate::types::{TableBlock, Word};

/// Words partitioned against a set of table regions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlapResolution {
    /// Words whose center lies in no table region.
    pub outside: Vec<Word>,
    /// `inside[i]` holds the words assigned to table region `i`.
    pub inside: Vec<Vec<Word>>,
}

impl OverlapResolution {
    pub fn inside_count(&self) -> usize {
        self.inside.iter().map(Vec::len).sum()
    }
}

/// Partition `words` against the bounding boxes of `tables`.
pub fn resolve(words: &[Word], tables: &[TableBlock]) -> OverlapResolution {
    let regions: Vec<BoundingBox> = tables.iter().map(|t| t.bbox).collect();
    resolve_regions(words, &regions)
}

/// Partition `words` against arbitrary regions.
///
/// Each word is assigned to at most one region. When regions overlap, the
/// first region in `regions` that contains the word's center wins.
pub fn resolve_regions(words: &[Word], regions: &[BoundingBox]) -> OverlapResolution {
    let mut resolution = OverlapResolution {
        outside: Vec::with_capacity(words.len()),
        inside: vec![Vec::new(); regions.len()],
    };

    for word in words {
        match regions.iter().position(|region| is_inside(word, region)) {
            Some(index) => resolution.inside[index].push(word.clone()),
            None => resolution.outside.push(word.clone()),
        }
    }

    resolution
}
