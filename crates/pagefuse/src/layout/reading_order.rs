//! Top-to-bottom merging of text lines and tables.
//!
//! No column-aware reflow is attempted: on multi-column pages lines from
//! different columns that share a vertical position interleave in input
//! order.

use std::cmp::Ordering;

use crate::table::render_markdown;
use crate::types::{Element, Line, TableBlock};

/// Wrap `lines` and `tables` as elements and stable-sort them by the top of
/// their bounding boxes.
///
/// Ties keep input order: all lines (as given) come before all tables (as given).
pub fn merge(lines: Vec<Line>, tables: Vec<TableBlock>) -> Vec<Element> {
    let mut elements: Vec<Element> = lines
        .into_iter()
        .map(Element::Text)
        .chain(tables.into_iter().map(Element::Table))
        .collect();

    // `sort_by` is stable.
    elements.sort_by(|a, b| a.y().partial_cmp(&b.y()).unwrap_or(Ordering::Equal));
    elements
}

/// Serialize merged elements into markdown-like text.
///
/// Text elements render their line text verbatim, blank lines included.
/// Tables render through [`render_markdown`]; tables that render empty are
/// omitted. Adjacent elements are separated by a blank line.
pub fn render(elements: &[Element]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(elements.len());

    for element in elements {
        match element {
            Element::Text(line) => parts.push(line.text.clone()),
            Element::Table(table) => {
                let rendered = render_markdown(&table.rows);
                if !rendered.is_empty() {
                    parts.push(rendered);
                }
            }
        }
    }

    parts.join("\n\n")
}

/// Render only the text elements of a merged sequence.
///
/// Used for the page's `full_text`, which never carries tables.
pub fn render_text(elements: &[Element]) -> String {
    elements
        .iter()
        .filter_map(|element| match element {
            Element::Text(line) => Some(line.text.as_str()),
            Element::Table(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::geometry::BoundingBox;
    use crate::types::ExtractionSource;

    fn line(text: &str, top: f64) -> Line {
        Line {
            text: text.to_string(),
            bbox: BoundingBox::new(0.0, top, 50.0, top + 8.0),
        }
    }

    fn table(top: f64, rows: &[&[&str]]) -> TableBlock {
        TableBlock::new(
            BoundingBox::new(0.0, top, 100.0, top + 40.0),
            rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect(),
            ExtractionSource::Native,
        )
    }

    #[test]
    fn test_merge_sorts_by_top() {
        let elements = merge(
            vec![line("after", 120.0), line("before", 10.0)],
            vec![table(50.0, &[&["a"], &["1"]])],
        );

        assert_eq!(elements.len(), 3);
        assert!(elements.windows(2).all(|w| w[0].y() <= w[1].y()));
        assert!(matches!(&elements[0], Element::Text(l) if l.text == "before"));
        assert!(matches!(&elements[1], Element::Table(_)));
        assert!(matches!(&elements[2], Element::Text(l) if l.text == "after"));
    }

    #[test]
    fn test_merge_ties_keep_lines_before_tables() {
        let elements = merge(
            vec![line("left", 30.0), line("right", 30.0)],
            vec![table(30.0, &[&["h"], &["v"]])],
        );

        assert!(matches!(&elements[0], Element::Text(l) if l.text == "left"));
        assert!(matches!(&elements[1], Element::Text(l) if l.text == "right"));
        assert!(matches!(&elements[2], Element::Table(_)));
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge(vec![], vec![]).is_empty());
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn test_render_joins_with_blank_lines() {
        let elements = merge(
            vec![line("Title", 0.0), line("Footer", 200.0)],
            vec![table(50.0, &[&["Item", "Qty"], &["Pen", "2"]])],
        );
        let text = render(&elements);
        assert_eq!(
            text,
            "Title\n\n| Item | Qty |\n| --- | --- |\n| Pen | 2 |\n\nFooter"
        );
    }

    #[test]
    fn test_render_omits_header_only_tables() {
        let elements = merge(vec![line("Body", 0.0)], vec![table(10.0, &[&["Just", "Header"]])]);
        assert_eq!(render(&elements), "Body");
    }

    #[test]
    fn test_render_passes_blank_lines_through() {
        let elements = merge(vec![line("a", 0.0), line("", 10.0), line("b", 20.0)], vec![]);
        assert_eq!(render(&elements), "a\n\n\n\nb");
    }

    #[test]
    fn test_render_text_skips_tables() {
        let elements = merge(
            vec![line("one", 0.0), line("two", 100.0)],
            vec![table(50.0, &[&["h"], &["v"]])],
        );
        assert_eq!(render_text(&elements), "one\n\ntwo");
    }
}
