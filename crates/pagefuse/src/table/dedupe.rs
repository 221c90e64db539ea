//! Merging of table sets produced by independent sources.

use ahash::AHashSet;

use super::normalize::grid_width;
use crate::types::TableBlock;

const CELL_SEPARATOR: char = '\u{1f}';
const ROW_SEPARATOR: char = '\u{1e}';

/// Whitespace-insensitive identity of a table's normalized grid.
///
/// Every row is read at the grid's width ([`grid_width`]): missing cells count
/// as `""` and cells past the width are ignored, so a ragged grid and its
/// padded form share a key. Whitespace is removed from each cell; cells and
/// rows are joined with control separators so `["ab"]` and `["a", "b"]` stay
/// distinct. Captions, bounding boxes and sources do not take part.
pub fn canonical_key(table: &TableBlock) -> String {
    let width = grid_width(&table.rows);
    let mut key = String::new();
    for (row_index, row) in table.rows.iter().enumerate() {
        if row_index > 0 {
            key.push(ROW_SEPARATOR);
        }
        for cell_index in 0..width {
            if cell_index > 0 {
                key.push(CELL_SEPARATOR);
            }
            if let Some(cell) = row.get(cell_index) {
                key.extend(cell.chars().filter(|c| !c.is_whitespace()));
            }
        }
    }
    key
}

/// Keep every `primary` table, then each `secondary` table whose canonical
/// content matches neither a primary table nor an earlier accepted secondary.
///
/// `dedupe(x, x) == x` for any list `x`.
pub fn dedupe(primary: Vec<TableBlock>, secondary: Vec<TableBlock>) -> Vec<TableBlock> {
    let mut seen: AHashSet<String> = primary.iter().map(canonical_key).collect();
    let mut merged = primary;

    for table in secondary {
        if seen.insert(canonical_key(&table)) {
            merged.push(table);
        } else {
            tracing::debug!(source = %table.source, "Dropping duplicate table");
        }
    }

    merged
}
