//! Locating externally supplied titles in the document text.
//!
//! Entries are resolved in order with a forward-only cursor: each search
//! starts on the line after the previous match, so repeated titles land on
//! successive occurrences.

use serde::{Deserialize, Serialize};

use crate::hierarchy::OutlineEntry;
use crate::span::{match_key, TextSpan};

/// Vertical distance under which two spans share a line.
const LINE_Y_TOLERANCE: f32 = 1.0;

/// A title from a bookmark file or Markdown outline, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub title: String,
    pub level: Option<u8>,
    /// Declared 1-based page; skips the text search when present.
    pub page: Option<u32>,
}

impl SourceEntry {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            level: None,
            page: None,
        }
    }
}

/// Result of resolving one [`SourceEntry`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchEntry {
    pub title: String,
    pub level: u8,
    pub page: Option<u32>,
    pub matched: bool,
    /// 1.0 for exact, the similarity ratio for fuzzy hits, 0.0 when unmatched.
    pub confidence: f32,
}

impl MatchEntry {
    pub fn to_outline_entry(&self) -> OutlineEntry {
        OutlineEntry::new(self.title.clone(), self.level, self.page)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchConfig {
    /// Fall back to similarity matching when no line contains the title.
    pub fuzzy: bool,
    /// Minimum similarity ratio (exclusive) for a fuzzy hit.
    pub fuzzy_threshold: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            fuzzy: true,
            fuzzy_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone)]
struct IndexedLine {
    page: usize,
    key: String,
}

/// Searchable text lines of a document, in reading order.
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    lines: Vec<IndexedLine>,
}

impl TextIndex {
    /// Build the index from spans in document order.
    pub fn from_spans(spans: &[TextSpan]) -> Self {
        let mut lines: Vec<IndexedLine> = Vec::new();
        let mut current: Option<(usize, f32, String)> = None;

        for span in spans {
            match current.as_mut() {
                Some((page, y, text)) if *page == span.page && (*y - span.y).abs() <= LINE_Y_TOLERANCE => {
                    text.push(' ');
                    text.push_str(&span.text);
                }
                _ => {
                    if let Some((page, _, text)) = current.take() {
                        lines.push(IndexedLine {
                            page,
                            key: match_key(&text),
                        });
                    }
                    current = Some((span.page, span.y, span.text.clone()));
                }
            }
        }
        if let Some((page, _, text)) = current {
            lines.push(IndexedLine {
                page,
                key: match_key(&text),
            });
        }

        lines.retain(|l| !l.key.is_empty());
        Self { lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Index of the first line on or after the given 0-based page.
    fn first_line_on_or_after(&self, page: usize) -> usize {
        self.lines.partition_point(|l| l.page < page)
    }

    /// First line at or after `from` containing `key`.
    fn find_exact(&self, key: &str, from: usize) -> Option<usize> {
        self.lines
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, l)| l.key.contains(key))
            .map(|(i, _)| i)
    }

    /// Best line at or after `from` whose similarity to `key` exceeds the
    /// threshold. Earlier lines win ties.
    fn find_fuzzy(&self, key: &str, from: usize, threshold: f32) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        let key_len = key.chars().count();
        for (i, line) in self.lines.iter().enumerate().skip(from) {
            // min / max bounds the ratio from above.
            let line_len = line.key.chars().count();
            if key_len.min(line_len) as f32 / key_len.max(line_len).max(1) as f32 <= threshold {
                continue;
            }
            let ratio = similarity(key, &line.key);
            if ratio > threshold && best.is_none_or(|(_, b)| ratio > b) {
                best = Some((i, ratio));
            }
        }
        best
    }
}

/// Resolve every entry against the index, preserving order.
pub fn resolve_entries(entries: &[SourceEntry], index: &TextIndex, config: &MatchConfig) -> Vec<MatchEntry> {
    let mut cursor = 0usize;

    entries
        .iter()
        .map(|entry| {
            let level = entry.level.unwrap_or(1).max(1);
            let title = entry.title.trim().to_string();

            if let Some(page) = entry.page {
                cursor = index.first_line_on_or_after(page.saturating_sub(1) as usize);
                return MatchEntry {
                    title,
                    level,
                    page: Some(page),
                    matched: true,
                    confidence: 1.0,
                };
            }

            let key = match_key(&title);
            let hit = if key.is_empty() {
                None
            } else {
                index.find_exact(&key, cursor).map(|i| (i, 1.0)).or_else(|| {
                    config
                        .fuzzy
                        .then(|| index.find_fuzzy(&key, cursor, config.fuzzy_threshold))
                        .flatten()
                })
            };

            match hit {
                Some((line, confidence)) => {
                    cursor = line + 1;
                    MatchEntry {
                        title,
                        level,
                        page: Some(index.lines[line].page as u32 + 1),
                        matched: true,
                        confidence,
                    }
                }
                None => MatchEntry {
                    title,
                    level,
                    page: None,
                    matched: false,
                    confidence: 0.0,
                },
            }
        })
        .collect()
}

/// `lcs / max(len(a), len(b))` over characters, in `[0, 1]`. Empty input
/// is never similar to anything.
pub fn similarity(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()] as f32 / a.len().max(b.len()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::fixtures::span;

    fn pages(result: &[MatchEntry]) -> Vec<Option<u32>> {
        result.iter().map(|m| m.page).collect()
    }

    fn index_of(lines: &[(&str, usize)]) -> TextIndex {
        let spans: Vec<TextSpan> = lines
            .iter()
            .enumerate()
            .map(|(i, (text, page))| span(text, *page, 72.0, 700.0 - i as f32 * 20.0, 12.0))
            .collect();
        TextIndex::from_spans(&spans)
    }

    #[test]
    fn test_monotonic_forward_search() {
        let index = index_of(&[
            ("Intro", 0),
            ("filler", 1),
            ("Intro", 4),
            ("Methods", 5),
        ]);
        let entries = vec![
            SourceEntry::titled("Intro"),
            SourceEntry::titled("Intro"),
            SourceEntry::titled("Methods"),
        ];
        let result = resolve_entries(&entries, &index, &MatchConfig::default());
        assert_eq!(pages(&result), vec![Some(1), Some(5), Some(6)]);
        assert!(result.iter().all(|m| m.matched));
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let index = index_of(&[("CHAPTER 2: THE RESULTS ARE IN", 2)]);
        let result = resolve_entries(&[SourceEntry::titled("the results")], &index, &MatchConfig::default());
        assert_eq!(pages(&result), vec![Some(3)]);
        assert_eq!(result[0].confidence, 1.0);
    }

    #[test]
    fn test_unmatched_entry_keeps_cursor() {
        let index = index_of(&[("Preface", 0), ("Epilogue", 3)]);
        let entries = vec![
            SourceEntry::titled("Preface"),
            SourceEntry::titled("Chapter 1"),
            SourceEntry::titled("Epilogue"),
        ];
        let result = resolve_entries(&entries, &index, &MatchConfig::default());
        assert_eq!(pages(&result), vec![Some(1), None, Some(4)]);
        assert!(!result[1].matched);
        assert_eq!(result[1].confidence, 0.0);
    }

    #[test]
    fn test_declared_page_moves_cursor() {
        let index = index_of(&[("Summary", 0), ("Summary", 6), ("Outlook", 7)]);
        let entries = vec![
            SourceEntry {
                title: "Opening".into(),
                level: Some(1),
                page: Some(5),
            },
            SourceEntry::titled("Summary"),
        ];
        let result = resolve_entries(&entries, &index, &MatchConfig::default());
        assert_eq!(pages(&result), vec![Some(5), Some(7)]);
    }

    #[test]
    fn test_same_page_repeats_resolve_to_next_line() {
        let index = index_of(&[("Note", 0), ("Note", 0)]);
        let entries = vec![SourceEntry::titled("Note"), SourceEntry::titled("Note")];
        let result = resolve_entries(&entries, &index, &MatchConfig::default());
        assert_eq!(pages(&result), vec![Some(1), Some(1)]);
        let result = resolve_entries(
            &[
                SourceEntry::titled("Note"),
                SourceEntry::titled("Note"),
                SourceEntry::titled("Note"),
            ],
            &index,
            &MatchConfig::default(),
        );
        assert_eq!(pages(&result), vec![Some(1), Some(1), None]);
    }

    #[test]
    fn test_fuzzy_fallback() {
        let index = index_of(&[("Experimental Setup and Results", 2)]);
        let entries = vec![SourceEntry::titled("Experimental Setup & Result")];

        let exact = MatchConfig {
            fuzzy: false,
            ..MatchConfig::default()
        };
        let strict = resolve_entries(&entries, &index, &exact);
        assert!(!strict[0].matched);

        let result = resolve_entries(&entries, &index, &MatchConfig::default());
        assert!(result[0].matched);
        assert_eq!(result[0].page, Some(3));
        assert!(result[0].confidence > 0.8 && result[0].confidence < 1.0);
    }

    #[test]
    fn test_spans_on_one_line_are_joined() {
        let spans = vec![
            span("1.", 0, 72.0, 700.0, 14.0),
            span("Introduction", 0, 90.0, 700.2, 14.0),
            span("Body", 0, 72.0, 680.0, 12.0),
        ];
        let index = TextIndex::from_spans(&spans);
        assert_eq!(index.len(), 2);
        let result = resolve_entries(&[SourceEntry::titled("1. Introduction")], &index, &MatchConfig::default());
        assert_eq!(pages(&result), vec![Some(1)]);
    }

    #[test]
    fn test_levels_default_to_one() {
        let index = index_of(&[("Alpha", 0)]);
        let result = resolve_entries(
            &[SourceEntry {
                title: "Alpha".into(),
                level: Some(0),
                page: None,
            }],
            &index,
            &MatchConfig::default(),
        );
        assert_eq!(result[0].level, 1);
        assert_eq!(result[0].to_outline_entry(), OutlineEntry::new("Alpha", 1, Some(1)));
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("", ""), 0.0);
        assert!((similarity("abcd", "abxd") - 0.75).abs() < 1e-6);
        // The longer string sets the denominator.
        assert!((similarity("ab", "abcd") - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_fuzzy_threshold_is_exclusive() {
        // "colr" shares 4 of 5 characters with "color": exactly 0.8.
        let index = index_of(&[("color", 1)]);
        let result = resolve_entries(&[SourceEntry::titled("colr")], &index, &MatchConfig::default());
        assert!(!result[0].matched);

        // 5 of 6: above the threshold.
        let index = index_of(&[("colour", 1)]);
        let result = resolve_entries(&[SourceEntry::titled("colur")], &index, &MatchConfig::default());
        assert_eq!(pages(&result), vec![Some(2)]);
        assert!((result[0].confidence - 5.0 / 6.0).abs() < 1e-6);
    }
}
