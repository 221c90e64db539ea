use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::layout::geometry::BoundingBox;

/// Which extraction source produced a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// Read from the document's embedded content layer.
    Native,
    /// Produced by region detection + text recognition, or the table-structure engine.
    Ocr,
    /// Produced by the vision transcription service.
    Vision,
}

impl fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Native => "native",
            Self::Ocr => "ocr",
            Self::Vision => "vision",
        };
        f.write_str(name)
    }
}

/// A single word with its position on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub bbox: BoundingBox,
}

impl Word {
    pub fn new(text: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }
}

/// A line of text: words grouped by vertical position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub text: String,
    /// Union of the member word boxes.
    pub bbox: BoundingBox,
}

/// A table in canonical grid form.
///
/// `rows[0]` is the header row. Body rows are kept at the header's width by
/// the normalizer; the renderer re-applies the same padding/truncation for
/// blocks built by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBlock {
    pub bbox: BoundingBox,
    pub rows: Vec<Vec<String>>,
    pub source: ExtractionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl TableBlock {
    pub fn new(bbox: BoundingBox, rows: Vec<Vec<String>>, source: ExtractionSource) -> Self {
        Self {
            bbox,
            rows,
            source,
            caption: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Number of body rows (everything after the header).
    pub fn data_row_count(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }
}

/// Unit the reading-order merger operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Text(Line),
    Table(TableBlock),
}

impl Element {
    /// Sort key: the top of the element's bounding box.
    pub fn y(&self) -> f64 {
        self.bbox().top()
    }

    pub fn bbox(&self) -> &BoundingBox {
        match self {
            Element::Text(line) => &line.bbox,
            Element::Table(table) => &table.bbox,
        }
    }
}

/// Counters for the native extraction of one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub words_total: usize,
    /// Words dropped from free text because they fall inside a table region.
    pub words_in_tables: usize,
    pub lines: usize,
    pub tables: usize,
    /// Characters of free text (table cells excluded).
    pub text_chars: usize,
}

/// Native-path result for one page, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageExtraction {
    pub page_number: usize,
    pub elements: Vec<Element>,
    pub stats: ExtractionStats,
}

/// Output of a text recognizer for one crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    /// Recognizer confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

impl Recognition {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }
}

/// A recognized region of a page image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrRegion {
    pub bbox: BoundingBox,
    pub text: String,
    /// Recognizer confidence in `[0.0, 1.0]`. Never gates inclusion.
    pub confidence: f64,
}

/// A titled block of content returned by the vision service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    pub content: String,
}

/// Terminal output of fusion for one page, before stats are attached.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub final_text: String,
    pub table_blocks: Vec<TableBlock>,
    pub supplement_applied: bool,
    pub char_counts_by_source: BTreeMap<ExtractionSource, usize>,
    pub sections: Vec<VisionSection>,
    pub visual_notes: Vec<String>,
    /// The vision call failed or returned nothing usable.
    pub vision_failed: bool,
    /// Whether the vision response parsed as structured JSON.
    pub vision_structured: bool,
}

/// One page as handed to the engine by the native extractor and renderer.
#[derive(Debug, Clone, Default)]
pub struct PageInput {
    /// 1-indexed page number.
    pub page_number: usize,
    /// Native words with positions (empty for scanned pages).
    pub words: Vec<Word>,
    /// Native tables with positions.
    pub tables: Vec<TableBlock>,
    /// Rendered page image, or the scan itself. Required for OCR and vision.
    pub image: Option<Arc<DynamicImage>>,
    /// The page's content layer embeds raster images.
    pub has_embedded_images: bool,
}

impl PageInput {
    pub fn new(page_number: usize) -> Self {
        Self {
            page_number,
            ..Default::default()
        }
    }

    pub fn with_words(mut self, words: Vec<Word>) -> Self {
        self.words = words;
        self
    }

    pub fn with_tables(mut self, tables: Vec<TableBlock>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_image(mut self, image: DynamicImage) -> Self {
        self.image = Some(Arc::new(image));
        self
    }

    pub fn with_embedded_images(mut self, has_embedded_images: bool) -> Self {
        self.has_embedded_images = has_embedded_images;
        self
    }
}

/// Per-page statistics of the fused result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageStats {
    pub source_char_counts: BTreeMap<ExtractionSource, usize>,
    pub regions_recognized: usize,
    /// Regions whose confidence fell below the configured threshold (still included).
    pub low_confidence_regions: usize,
    pub tables_found: usize,
    pub vision_applied: bool,
    pub vision_failed: bool,
    pub vision_structured: bool,
    pub supplement_applied: bool,
    /// Region OCR ran for this page.
    pub hybrid_ran: bool,
}

/// Final fused output for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutput {
    pub page_number: usize,
    /// Reconciled text body. Tables are not interleaved here.
    pub full_text: String,
    /// Deduplicated tables in priority order.
    pub tables: Vec<TableBlock>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<VisionSection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub visual_notes: Vec<String>,
    pub stats: PageStats,
}

impl PageOutput {
    /// Text body followed by every table rendered as markdown.
    pub fn to_markdown(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.tables.len() + 1);
        if !self.full_text.trim().is_empty() {
            parts.push(self.full_text.trim_end().to_string());
        }
        for table in &self.tables {
            let rendered = crate::table::render_markdown(&table.rows);
            if rendered.is_empty() {
                continue;
            }
            match &table.caption {
                Some(caption) if !caption.trim().is_empty() => {
                    parts.push(format!("{}\n\n{}", caption.trim(), rendered));
                }
                _ => parts.push(rendered),
            }
        }
        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
    }

    #[test]
    fn test_element_y_is_bbox_top() {
        let line = Line {
            text: "hello".to_string(),
            bbox: BoundingBox::new(0.0, 12.0, 10.0, 20.0),
        };
        assert_eq!(Element::Text(line).y(), 12.0);

        let table = TableBlock::new(BoundingBox::new(0.0, 40.0, 10.0, 90.0), vec![], ExtractionSource::Native);
        assert_eq!(Element::Table(table).y(), 40.0);
    }

    #[test]
    fn test_recognition_clamps_confidence() {
        assert_eq!(Recognition::new("x", 1.7).confidence, 1.0);
        assert_eq!(Recognition::new("x", -0.2).confidence, 0.0);
    }

    #[test]
    fn test_table_block_data_rows() {
        let table = TableBlock::new(
            BoundingBox::default(),
            grid(&[&["a", "b"], &["1", "2"]]),
            ExtractionSource::Ocr,
        );
        assert_eq!(table.header(), Some(&["a".to_string(), "b".to_string()][..]));
        assert_eq!(table.data_row_count(), 1);
        assert_eq!(
            TableBlock::new(BoundingBox::default(), vec![], ExtractionSource::Ocr).data_row_count(),
            0
        );
    }

    #[test]
    fn test_page_output_markdown_appends_tables() {
        let output = PageOutput {
            page_number: 1,
            full_text: "Invoice 42".to_string(),
            tables: vec![
                TableBlock::new(
                    BoundingBox::default(),
                    grid(&[&["Item", "Qty"], &["Pen", "2"]]),
                    ExtractionSource::Native,
                )
                .with_caption("Line items"),
                TableBlock::new(BoundingBox::default(), grid(&[&["Only", "Header"]]), ExtractionSource::Ocr),
            ],
            sections: vec![],
            visual_notes: vec![],
            stats: PageStats::default(),
        };

        let markdown = output.to_markdown();
        assert!(markdown.starts_with("Invoice 42\n\nLine items\n\n| Item | Qty |"));
        assert!(markdown.contains("| Pen | 2 |"));
        assert!(!markdown.contains("Only"));
    }

    #[test]
    fn test_source_serializes_snake_case() {
        let json = serde_json::to_string(&ExtractionSource::Ocr).unwrap();
        assert_eq!(json, "\"ocr\"");
        assert_eq!(ExtractionSource::Vision.to_string(), "vision");
    }
}
