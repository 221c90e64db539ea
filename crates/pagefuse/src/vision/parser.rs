//! Best-effort parsing of vision transcription responses.
//!
//! Vision models are asked for a JSON object but routinely wrap it in prose,
//! put it in a markdown fence, or emit invalid escapes. Parsing tries an
//! ordered list of pure strategies and stops at the first that yields a JSON
//! object:
//!
//! 1. [`ParseStrategy::Direct`]: the whole response is the object
//! 2. [`ParseStrategy::Fenced`]: a ```` ```json ```` block anywhere in the text
//! 3. [`ParseStrategy::Brace`]: the first balanced `{...}` span, string-aware
//! 4. [`ParseStrategy::Repaired`]: escape and trailing-comma repair, then 1-3 again
//!
//! When every strategy fails the raw response becomes the page text with
//! `structured = false`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::table::{RawTable, normalize};
use crate::types::{ExtractionSource, TableBlock, VisionSection};

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?[ \t]*\r?\n?(.*?)```").expect("fenced block regex is valid"));

const TEXT_KEYS: &[&str] = &["full_text", "text", "content"];
const SECTION_HEADING_KEYS: &[&str] = &["heading", "title"];
const SECTION_CONTENT_KEYS: &[&str] = &["content", "text", "body"];
const NOTES_KEYS: &[&str] = &["visual_notes", "notes"];

/// Limit on `{` start positions tried by the brace strategy.
const MAX_BRACE_STARTS: usize = 16;

/// The strategy that produced a structured payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    Direct,
    Fenced,
    Brace,
    Repaired,
}

/// A vision response reduced to the fields the engine uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisionPayload {
    pub full_text: String,
    pub sections: Vec<VisionSection>,
    pub tables: Vec<TableBlock>,
    pub visual_notes: Vec<String>,
    /// The response parsed as a JSON object with at least one known field.
    pub structured: bool,
    pub strategy: Option<ParseStrategy>,
}

impl VisionPayload {
    fn unstructured(raw: &str) -> Self {
        Self {
            full_text: raw.trim().to_string(),
            ..Default::default()
        }
    }

    /// Transcribed body: `full_text`, or the sections assembled in order when
    /// `full_text` is empty.
    pub fn body_text(&self) -> String {
        if !self.full_text.trim().is_empty() {
            return self.full_text.trim().to_string();
        }
        self.sections
            .iter()
            .filter_map(|section| {
                let content = section.content.trim();
                match section.heading.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
                    Some(heading) if content.is_empty() => Some(heading.to_string()),
                    Some(heading) => Some(format!("{}\n\n{}", heading, content)),
                    None if content.is_empty() => None,
                    None => Some(content.to_string()),
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Body text followed by the visual notes as a `Visual notes:` list.
    pub fn text_with_notes(&self) -> String {
        let body = self.body_text();
        let notes: Vec<&str> = self
            .visual_notes
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect();
        if notes.is_empty() {
            return body;
        }

        let mut text = body;
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str("Visual notes:");
        for note in notes {
            text.push_str("\n- ");
            text.push_str(note);
        }
        text
    }

    /// Nothing usable came back.
    pub fn is_empty(&self) -> bool {
        self.text_with_notes().trim().is_empty() && self.tables.is_empty()
    }
}

/// Parse a raw vision response.
pub fn parse_response(raw: &str) -> VisionPayload {
    let Some((object, strategy)) = parse_object(raw) else {
        tracing::debug!("Vision response is not JSON, keeping raw text");
        return VisionPayload::unstructured(raw);
    };

    match payload_from_object(&object) {
        Some(mut payload) => {
            payload.strategy = Some(strategy);
            payload
        }
        None => {
            tracing::debug!(?strategy, "Vision JSON has no known fields, keeping raw text");
            VisionPayload::unstructured(raw)
        }
    }
}

/// Try each strategy in order; return the first JSON object found.
pub fn parse_object(raw: &str) -> Option<(Map<String, Value>, ParseStrategy)> {
    let strategies: [(ParseStrategy, fn(&str) -> Option<Map<String, Value>>); 4] = [
        (ParseStrategy::Direct, parse_direct),
        (ParseStrategy::Fenced, parse_fenced),
        (ParseStrategy::Brace, parse_brace),
        (ParseStrategy::Repaired, parse_repaired),
    ];

    strategies
        .iter()
        .find_map(|(strategy, parse)| parse(raw).map(|object| (object, *strategy)))
}

/// The whole text is a JSON object.
pub fn parse_direct(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// The first fenced block whose body is a JSON object.
pub fn parse_fenced(raw: &str) -> Option<Map<String, Value>> {
    FENCED_BLOCK
        .captures_iter(raw)
        .filter_map(|captures| captures.get(1))
        .find_map(|body| parse_direct(body.as_str()))
}

/// The first balanced `{...}` span that parses as an object.
pub fn parse_brace(raw: &str) -> Option<Map<String, Value>> {
    raw.match_indices('{')
        .take(MAX_BRACE_STARTS)
        .filter_map(|(start, _)| balanced_span(&raw[start..]))
        .find_map(parse_direct)
}

/// Repair common model mistakes and retry the other strategies.
pub fn parse_repaired(raw: &str) -> Option<Map<String, Value>> {
    let repaired = repair_json(raw);
    if repaired == raw {
        return None;
    }
    parse_direct(&repaired)
        .or_else(|| parse_fenced(&repaired))
        .or_else(|| parse_brace(&repaired))
}

/// Slice of `text` from its leading `{` to the matching `}`.
///
/// Braces inside string literals are ignored. Returns `None` when the span
/// never closes.
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=index]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Fix invalid escapes, raw control characters in strings, and trailing commas.
///
/// - `\x` where `x` is not a JSON escape becomes `\\x`
/// - newlines, carriage returns, tabs and other control characters inside
///   strings are escaped
/// - a `,` followed only by whitespace before `}` or `]` is dropped
pub fn repair_json(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len() + 16);
    let mut in_string = false;
    let mut index = 0;

    while index < chars.len() {
        let c = chars[index];

        if in_string {
            match c {
                '\\' => match chars.get(index + 1) {
                    Some(next) if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                        out.push('\\');
                        out.push(*next);
                        index += 2;
                        continue;
                    }
                    _ => out.push_str("\\\\"),
                },
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
            index += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next_significant = chars[index + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next_significant, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            c => out.push(c),
        }
        index += 1;
    }

    out
}

fn first_key<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| object.get(*key))
}

fn string_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(string_of).collect();
            Some(parts.join("\n"))
        }
        other => Some(other.to_string()),
    }
}

fn payload_from_object(object: &Map<String, Value>) -> Option<VisionPayload> {
    let text_value = first_key(object, TEXT_KEYS);
    let sections_value = object.get("sections");
    let tables_value = object.get("tables");
    let notes_value = first_key(object, NOTES_KEYS);

    if text_value.is_none() && sections_value.is_none() && tables_value.is_none() && notes_value.is_none() {
        return None;
    }

    let full_text = text_value.and_then(string_of).unwrap_or_default();

    let sections = sections_value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(section_of).collect())
        .unwrap_or_default();

    let tables = match tables_value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(RawTable::from_value)
            .map(|raw| normalize(raw, ExtractionSource::Vision))
            .filter(|table| table.data_row_count() > 0)
            .collect(),
        Some(single @ Value::Object(_)) => RawTable::from_value(single)
            .map(|raw| normalize(raw, ExtractionSource::Vision))
            .filter(|table| table.data_row_count() > 0)
            .into_iter()
            .collect(),
        _ => Vec::new(),
    };

    let visual_notes = match notes_value {
        Some(Value::Array(items)) => items.iter().filter_map(string_of).collect(),
        Some(Value::String(note)) if !note.trim().is_empty() => vec![note.clone()],
        _ => Vec::new(),
    };

    Some(VisionPayload {
        full_text,
        sections,
        tables,
        visual_notes,
        structured: true,
        strategy: None,
    })
}

fn section_of(value: &Value) -> Option<VisionSection> {
    match value {
        Value::String(content) => Some(VisionSection {
            heading: None,
            content: content.clone(),
        }),
        Value::Object(object) => {
            let heading = first_key(object, SECTION_HEADING_KEYS)
                .and_then(string_of)
                .filter(|h| !h.trim().is_empty());
            let content = first_key(object, SECTION_CONTENT_KEYS)
                .and_then(string_of)
                .unwrap_or_default();
            if heading.is_none() && content.trim().is_empty() {
                return None;
            }
            Some(VisionSection { heading, content })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_object() {
        let payload = parse_response(r#"{"full_text": "Hello", "visual_notes": ["logo top left"]}"#);
        assert!(payload.structured);
        assert_eq!(payload.strategy, Some(ParseStrategy::Direct));
        assert_eq!(payload.full_text, "Hello");
        assert_eq!(payload.visual_notes, vec!["logo top left".to_string()]);
    }

    #[test]
    fn test_fenced_block_in_prose() {
        let raw = "Here is the transcription you asked for:\n```json {\"full_text\":\"X\"} ```\nLet me know if you need more.";
        let payload = parse_response(raw);
        assert!(payload.structured);
        assert_eq!(payload.strategy, Some(ParseStrategy::Fenced));
        assert_eq!(payload.full_text, "X");
    }

    #[test]
    fn test_fenced_block_multiline() {
        let raw = "Sure.\n\n```json\n{\n  \"full_text\": \"line one\\nline two\"\n}\n```";
        let object = parse_fenced(raw).unwrap();
        assert_eq!(object["full_text"], "line one\nline two");
        assert!(parse_direct(raw).is_none());
    }

    #[test]
    fn test_brace_matching_ignores_braces_in_strings() {
        let raw = r#"Result: {"full_text": "a } b { c", "sections": []} trailing words"#;
        assert!(parse_fenced(raw).is_none());
        let object = parse_brace(raw).unwrap();
        assert_eq!(object["full_text"], "a } b { c");
    }

    #[test]
    fn test_brace_skips_non_json_braces() {
        let raw = r#"Set {x} first, then {"full_text": "ok"}"#;
        assert_eq!(parse_brace(raw).unwrap()["full_text"], "ok");
    }

    #[test]
    fn test_repair_invalid_escapes_and_control_chars() {
        let raw = "{\"full_text\": \"C:\\path\\x and\nnew line\",}";
        assert!(parse_direct(raw).is_none());
        assert!(parse_brace(raw).is_none());

        let (object, strategy) = parse_object(raw).unwrap();
        assert_eq!(strategy, ParseStrategy::Repaired);
        assert_eq!(object["full_text"], "C:\\path\\x and\nnew line");
    }

    #[test]
    fn test_repair_trailing_commas() {
        assert_eq!(repair_json(r#"{"a": [1, 2, ], }"#), r#"{"a": [1, 2 ] }"#);
        assert_eq!(repair_json(r#"{"a": "x, }"}"#), r#"{"a": "x, }"}"#);
    }

    #[test]
    fn test_unparsable_keeps_raw_text() {
        let payload = parse_response("  The page shows a handwritten note.  ");
        assert!(!payload.structured);
        assert_eq!(payload.strategy, None);
        assert_eq!(payload.full_text, "The page shows a handwritten note.");
    }

    #[test]
    fn test_unknown_object_keeps_raw_text() {
        let payload = parse_response(r#"{"unexpected": 1}"#);
        assert!(!payload.structured);
        assert_eq!(payload.full_text, r#"{"unexpected": 1}"#);
    }

    #[test]
    fn test_sections_assemble_body_when_full_text_missing() {
        let payload = parse_response(
            r#"{"sections": [{"heading": "Summary", "content": "All good"}, "Loose paragraph", {"title": "Empty"}]}"#,
        );
        assert_eq!(payload.sections.len(), 3);
        assert_eq!(payload.body_text(), "Summary\n\nAll good\n\nLoose paragraph\n\nEmpty");
    }

    #[test]
    fn test_tables_normalized_as_vision() {
        let payload = parse_response(
            r#"{"full_text": "t", "tables": [{"headers": ["a", "b"], "rows": [["1"]]}, {"headers": ["only"], "rows": []}]}"#,
        );
        assert_eq!(payload.tables.len(), 1);
        assert_eq!(payload.tables[0].source, ExtractionSource::Vision);
        assert_eq!(payload.tables[0].rows[1], vec!["1".to_string(), String::new()]);
    }

    #[test]
    fn test_text_with_notes() {
        let payload = VisionPayload {
            full_text: "Body".to_string(),
            visual_notes: vec!["stamp".to_string(), " ".to_string(), "signature".to_string()],
            ..Default::default()
        };
        assert_eq!(payload.text_with_notes(), "Body\n\nVisual notes:\n- stamp\n- signature");

        let notes_only = VisionPayload {
            visual_notes: vec!["chart".to_string()],
            ..Default::default()
        };
        assert_eq!(notes_only.text_with_notes(), "Visual notes:\n- chart");
        assert!(!notes_only.is_empty());
        assert!(VisionPayload::default().is_empty());
    }
}
