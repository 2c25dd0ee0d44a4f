//! Field mapping from source documents to table records.
//!
//! Turns a [`Document`] (with its highlights attached) into a [`Record`]:
//! tag filtering, highlight block rendering, and UTC → fixed-offset
//! timestamp conversion. Everything here is pure.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};

use crate::config::Config;
use crate::models::{Document, Highlight, Record};

/// Label used for the italic note line under a highlight.
pub const NOTE_LABEL: &str = "注";

const OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Converts documents into records for one run.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    marker_tag: String,
    offset: FixedOffset,
}

impl FieldMapper {
    /// Build a mapper stripping `marker_tag`, rendering times at
    /// `utc_offset_hours`. Offsets outside ±23h fall back to UTC.
    pub fn new(marker_tag: impl Into<String>, utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
        Self {
            marker_tag: marker_tag.into(),
            offset,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.marker_tag(), config.mapping.utc_offset_hours)
    }

    pub fn map(&self, doc: &Document) -> Record {
        let joined = doc
            .updated_at
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(doc.created_at.as_deref())
            .unwrap_or("");

        Record {
            title: doc.title.clone().unwrap_or_default(),
            tags: filter_tags(doc.tags.iter().map(String::as_str), &self.marker_tag),
            highlights: render_highlight_block(&doc.highlights),
            summary: doc.summary.clone().unwrap_or_default(),
            url: doc.url().unwrap_or_default().to_string(),
            joined_time: convert_timestamp(joined, self.offset),
        }
    }
}

/// Drop `marker_tag` (case-insensitive) and blank tags, preserving order.
pub fn filter_tags<'a>(tags: impl IntoIterator<Item = &'a str>, marker_tag: &str) -> Vec<String> {
    let marker = marker_tag.trim().to_lowercase();
    tags.into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty() && t.to_lowercase() != marker)
        .map(str::to_string)
        .collect()
}

/// Render highlights as markdown block quotes.
///
/// Each highlight becomes `> text` (every line prefixed), followed directly
/// by `*注: note*` when a note is present. Entries are separated by one blank
/// line. Highlights with empty text are skipped.
pub fn render_highlight_block(highlights: &[Highlight]) -> String {
    highlights
        .iter()
        .filter(|h| !h.text.trim().is_empty())
        .map(|h| {
            let mut entry = h
                .text
                .lines()
                .map(|line| format!("> {}", line))
                .collect::<Vec<_>>()
                .join("\n");
            if let Some(note) = h.note.as_deref().filter(|n| !n.trim().is_empty()) {
                entry.push_str(&format!("\n*{}: {}*", NOTE_LABEL, note));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Convert a UTC timestamp string to `offset`, formatted `YYYY-MM-DD HH:MM:SS`.
///
/// Empty or whitespace-only input yields an empty string. Any other input
/// that cannot be parsed is returned unchanged.
pub fn convert_timestamp(raw: &str, offset: FixedOffset) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    match parse_utc(trimmed) {
        Some(utc) => utc.with_timezone(&offset).format(OUTPUT_FORMAT).to_string(),
        None => {
            tracing::debug!(input = raw, "timestamp conversion failed; keeping raw value");
            raw.to_string()
        }
    }
}

fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Naive timestamps are taken as UTC.
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beijing() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn hl(text: &str, note: Option<&str>) -> Highlight {
        Highlight {
            parent_id: "doc".to_string(),
            text: text.to_string(),
            note: note.map(str::to_string),
        }
    }

    #[test]
    fn test_highlight_block_exact_format() {
        let block = render_highlight_block(&[hl("A", None), hl("B", Some("n"))]);
        assert_eq!(block, "> A\n\n> B\n*注: n*");
    }

    #[test]
    fn test_highlight_block_empty() {
        assert_eq!(render_highlight_block(&[]), "");
        assert_eq!(render_highlight_block(&[hl("  ", Some("orphan"))]), "");
    }

    #[test]
    fn test_highlight_block_multiline_and_blank_note() {
        let block = render_highlight_block(&[hl("line one\nline two", Some(" ")), hl("C", None)]);
        assert_eq!(block, "> line one\n> line two\n\n> C");
    }

    #[test]
    fn test_highlight_block_preserves_order() {
        let forward = render_highlight_block(&[hl("A", None), hl("B", None)]);
        let reverse = render_highlight_block(&[hl("B", None), hl("A", None)]);
        assert_eq!(forward, "> A\n\n> B");
        assert_ne!(forward, reverse);
    }

    #[test]
    fn test_convert_timestamp_utc_plus_eight() {
        assert_eq!(
            convert_timestamp("2024-01-01T00:00:00Z", beijing()),
            "2024-01-01 08:00:00"
        );
        assert_eq!(
            convert_timestamp("2024-12-31T20:30:15.123456+00:00", beijing()),
            "2025-01-01 04:30:15"
        );
    }

    #[test]
    fn test_convert_timestamp_naive_is_utc() {
        assert_eq!(
            convert_timestamp("2024-01-01T00:00:00", beijing()),
            "2024-01-01 08:00:00"
        );
    }

    #[test]
    fn test_convert_timestamp_empty_and_malformed() {
        assert_eq!(convert_timestamp("", beijing()), "");
        assert_eq!(convert_timestamp("  \t", beijing()), "");
        assert_eq!(convert_timestamp("yesterday", beijing()), "yesterday");
        assert_eq!(convert_timestamp("2024-13-45", beijing()), "2024-13-45");
    }

    #[test]
    fn test_filter_tags_case_insensitive() {
        let tags = filter_tags(["AI101", "llm", "", "reading"], "ai101");
        assert_eq!(tags, vec!["llm", "reading"]);
    }

    #[test]
    fn test_map_full_document() {
        let doc = Document {
            id: "01abc".to_string(),
            title: Some("Attention".to_string()),
            tags: ["ai101", "papers"].iter().map(|s| s.to_string()).collect(),
            summary: None,
            source_url: Some("https://example.com/a".to_string()),
            updated_at: None,
            created_at: Some("2024-06-01T12:00:00Z".to_string()),
            highlights: vec![hl("quote", Some("mine"))],
        };

        let record = FieldMapper::new("AI101", 8).map(&doc);
        assert_eq!(record.title, "Attention");
        assert_eq!(record.tags, vec!["papers"]);
        assert_eq!(record.highlights, "> quote\n*注: mine*");
        assert_eq!(record.summary, "");
        assert_eq!(record.url, "https://example.com/a");
        assert_eq!(record.joined_time, "2024-06-01 20:00:00");
    }

    #[test]
    fn test_map_prefers_updated_over_created() {
        let doc = Document {
            updated_at: Some("2024-06-02T00:00:00Z".to_string()),
            created_at: Some("2024-06-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        let record = FieldMapper::new("x", 0).map(&doc);
        assert_eq!(record.joined_time, "2024-06-02 00:00:00");
        assert_eq!(record.title, "");
    }
}
