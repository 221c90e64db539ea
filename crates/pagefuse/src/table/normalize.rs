//! Canonical grid form for tables from heterogeneous sources.
//!
//! Table engines and vision responses describe tables in one of three shapes.
//! [`RawTable`] names those shapes and [`normalize`] turns each into a
//! [`TableBlock`] whose `rows[0]` is the header and whose body rows all have
//! the header's width. Nothing downstream branches on shape again.
//!
//! Width policy: short rows are right-padded with `""`, long rows are
//! truncated to the header's column count. Truncation is lossy on purpose;
//! the table is kept rather than dropped.

use serde_json::{Map, Value};

use crate::layout::geometry::BoundingBox;
use crate::types::{ExtractionSource, TableBlock};

/// A table as delivered by a source, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTable {
    /// Plain grid of cells. The first row is the header.
    RawGrid {
        rows: Vec<Vec<String>>,
        caption: Option<String>,
    },
    /// Header array plus one object per row, cells keyed by header name.
    NamedCellRows {
        headers: Vec<String>,
        rows: Vec<Map<String, Value>>,
        caption: Option<String>,
    },
    /// Header array plus positional row arrays.
    HeaderedRows {
        headers: Vec<String>,
        rows: Vec<Vec<Value>>,
        caption: Option<String>,
    },
}

const HEADER_KEYS: &[&str] = &["headers", "header", "columns"];
const ROW_KEYS: &[&str] = &["rows", "data"];
const CAPTION_KEYS: &[&str] = &["caption", "title"];

impl RawTable {
    pub fn grid(rows: Vec<Vec<String>>) -> Self {
        RawTable::RawGrid { rows, caption: None }
    }

    pub fn caption(&self) -> Option<&str> {
        match self {
            RawTable::RawGrid { caption, .. }
            | RawTable::NamedCellRows { caption, .. }
            | RawTable::HeaderedRows { caption, .. } => caption.as_deref(),
        }
    }

    /// Recognize one of the three shapes in a JSON value.
    ///
    /// Accepted forms:
    /// - an array of arrays (grid);
    /// - an array of objects (named cells, headers taken from key order of appearance);
    /// - an object with `headers`/`header`/`columns` and `rows`/`data`, where the
    ///   rows are arrays (headered rows) or objects (named cells);
    /// - an object with only `rows`/`data` holding arrays (grid).
    ///
    /// `caption` or `title` on an object becomes the caption. Returns `None`
    /// for anything else.
    pub fn from_value(value: &Value) -> Option<RawTable> {
        match value {
            Value::Array(items) => rows_without_headers(items, None),
            Value::Object(object) => {
                let caption = CAPTION_KEYS
                    .iter()
                    .find_map(|key| object.get(*key))
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());

                let rows = ROW_KEYS.iter().find_map(|key| object.get(*key)).and_then(Value::as_array)?;

                let headers = HEADER_KEYS
                    .iter()
                    .find_map(|key| object.get(*key))
                    .and_then(Value::as_array)
                    .map(|values| values.iter().map(cell_to_string).collect::<Vec<_>>());

                match headers {
                    Some(headers) => {
                        if rows.iter().any(Value::is_object) {
                            Some(RawTable::NamedCellRows {
                                headers,
                                rows: rows.iter().filter_map(Value::as_object).cloned().collect(),
                                caption,
                            })
                        } else {
                            Some(RawTable::HeaderedRows {
                                headers,
                                rows: rows
                                    .iter()
                                    .map(|row| row.as_array().cloned().unwrap_or_else(|| vec![row.clone()]))
                                    .collect(),
                                caption,
                            })
                        }
                    }
                    None => rows_without_headers(rows, caption),
                }
            }
            _ => None,
        }
    }
}

fn rows_without_headers(items: &[Value], caption: Option<String>) -> Option<RawTable> {
    if items.is_empty() {
        return None;
    }

    if items.iter().all(Value::is_array) {
        let rows = items
            .iter()
            .filter_map(Value::as_array)
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        return Some(RawTable::RawGrid { rows, caption });
    }

    if items.iter().all(Value::is_object) {
        let mut headers: Vec<String> = Vec::new();
        for object in items.iter().filter_map(Value::as_object) {
            for key in object.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.clone());
                }
            }
        }
        return Some(RawTable::NamedCellRows {
            headers,
            rows: items.iter().filter_map(Value::as_object).cloned().collect(),
            caption,
        });
    }

    None
}

/// Stringify a JSON cell. `null` becomes `""`; strings are trimmed.
pub fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Normalize a raw table into canonical grid form.
///
/// The returned block has a default bounding box; callers that know the
/// table's position set `bbox` afterwards.
pub fn normalize(raw: RawTable, source: ExtractionSource) -> TableBlock {
    let (header, body, caption): (Vec<String>, Vec<Vec<String>>, Option<String>) = match raw {
        RawTable::RawGrid { rows, caption } => {
            let mut rows = rows.into_iter();
            let header = rows.next().unwrap_or_default();
            (trim_all(header), rows.map(trim_all).collect(), caption)
        }
        RawTable::NamedCellRows { headers, rows, caption } => {
            let header = trim_all(headers);
            let body = rows.iter().map(|row| named_row(&header, row)).collect();
            (header, body, caption)
        }
        RawTable::HeaderedRows { headers, rows, caption } => {
            let body = rows
                .iter()
                .map(|row| row.iter().map(cell_to_string).collect())
                .collect();
            (trim_all(headers), body, caption)
        }
    };

    let mut block = TableBlock::new(BoundingBox::default(), fit_to_header(header, body), source);
    block.caption = caption.filter(|c| !c.trim().is_empty());
    block
}

fn trim_all(cells: Vec<String>) -> Vec<String> {
    cells.into_iter().map(|c| c.trim().to_string()).collect()
}

/// Look up each header's cell: exact key first, then a case-insensitive
/// trimmed match. Missing cells are `""`.
fn named_row(headers: &[String], row: &Map<String, Value>) -> Vec<String> {
    headers
        .iter()
        .map(|header| {
            row.get(header)
                .or_else(|| {
                    let wanted = header.trim().to_lowercase();
                    row.iter()
                        .find(|(key, _)| key.trim().to_lowercase() == wanted)
                        .map(|(_, value)| value)
                })
                .map(cell_to_string)
                .unwrap_or_default()
        })
        .collect()
}

/// Pad or truncate every body row to the header's width.
///
/// A header with no cells is widened to the widest body row first so an
/// unlabeled grid keeps its content.
fn fit_to_header(mut header: Vec<String>, body: Vec<Vec<String>>) -> Vec<Vec<String>> {
    if header.is_empty() {
        let widest = body.iter().map(Vec::len).max().unwrap_or(0);
        header = vec![String::new(); widest];
    }
    let width = header.len();

    let mut rows = Vec::with_capacity(body.len() + 1);
    rows.push(header);
    for mut row in body {
        row.resize(width, String::new());
        rows.push(row);
    }
    rows
}

/// Column count of a grid in canonical form: the header's width, or the
/// widest body row when the header has no cells.
pub fn grid_width(rows: &[Vec<String>]) -> usize {
    match rows.split_first() {
        Some((header, body)) if header.is_empty() => body.iter().map(Vec::len).max().unwrap_or(0),
        Some((header, _)) => header.len(),
        None => 0,
    }
}

/// Render a grid as a pipe-delimited markdown table.
///
/// `rows[0]` is the header. Body rows are padded or truncated to the header
/// width. Cell text has `|` escaped and line breaks flattened to spaces.
/// Returns an empty string when there are no data rows.
pub fn render_markdown(rows: &[Vec<String>]) -> String {
    let Some((header, body)) = rows.split_first() else {
        return String::new();
    };
    if body.is_empty() {
        return String::new();
    }

    let width = grid_width(rows);
    if width == 0 {
        return String::new();
    }

    let mut markdown = String::new();
    push_row(&mut markdown, header, width);
    markdown.push('\n');

    markdown.push('|');
    for _ in 0..width {
        markdown.push_str(" --- |");
    }

    for row in body {
        markdown.push('\n');
        push_row(&mut markdown, row, width);
    }

    markdown
}

fn push_row(out: &mut String, row: &[String], width: usize) {
    out.push('|');
    for index in 0..width {
        let cell = row.get(index).map(String::as_str).unwrap_or("");
        out.push(' ');
        out.push_str(&escape_cell(cell));
        out.push_str(" |");
    }
}

fn escape_cell(cell: &str) -> String {
    cell.trim()
        .replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}
