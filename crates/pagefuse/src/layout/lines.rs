//! Grouping of words into text lines.

use std::cmp::Ordering;

use crate::types::{Line, Word};

/// Default vertical tolerance, in page units.
pub const DEFAULT_LINE_TOLERANCE: f64 = 3.0;

/// Groups words into lines by the top edge of their boxes.
///
/// Words are visited in `(top, x0)` order. A word joins the open line while
/// `|word.top - line.top| <= tolerance`; otherwise the line is closed and a
/// new one starts with that word. Closed lines join their words with single
/// spaces in left-to-right order.
#[derive(Debug, Clone, Copy)]
pub struct LineGrouper {
    tolerance: f64,
}

impl Default for LineGrouper {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_LINE_TOLERANCE,
        }
    }
}

impl LineGrouper {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance: tolerance.max(0.0),
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn group(&self, words: &[Word]) -> Vec<Line> {
        if words.is_empty() {
            return Vec::new();
        }

        let mut sorted: Vec<&Word> = words.iter().collect();
        sorted.sort_by(|a, b| {
            cmp_f64(a.bbox.top(), b.bbox.top()).then_with(|| cmp_f64(a.bbox.left(), b.bbox.left()))
        });

        let mut lines = Vec::new();
        let mut current: Vec<&Word> = Vec::new();
        let mut line_top = 0.0;

        for word in sorted {
            if !current.is_empty() && (word.bbox.top() - line_top).abs() > self.tolerance {
                lines.push(close_line(&mut current));
            }
            if current.is_empty() {
                line_top = word.bbox.top();
            }
            current.push(word);
        }

        if !current.is_empty() {
            lines.push(close_line(&mut current));
        }

        lines
    }
}

fn close_line(words: &mut Vec<&Word>) -> Line {
    words.sort_by(|a, b| cmp_f64(a.bbox.left(), b.bbox.left()));

    let mut bbox = words[0].bbox;
    for word in words.iter().skip(1) {
        bbox = bbox.union(&word.bbox);
    }

    let text = words
        .iter()
        .map(|w| w.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    words.clear();
    Line { text, bbox }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}
