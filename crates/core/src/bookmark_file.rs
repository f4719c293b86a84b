//! Bookmark files: JSON, CSV or plain-text outlines supplied by the user.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::matching::SourceEntry;
use crate::ParseError;

static TXT_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(.*?)\s*[(（]\s*(?:(?:level|层级)\s*(\d+))?\s*[,，]?\s*(?:(?:page|页面|页)\s*(\d+))?\s*[)）]\s*$",
    )
    .unwrap()
});

static TXT_TOC_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?\S)(?:\s*[.·…]{2,}\s*|\t+|\s{2,})(\d{1,5})$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Json,
    Csv,
    Txt,
}

impl SourceFormat {
    /// Pick the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(SourceFormat::Json),
            "csv" => Ok(SourceFormat::Csv),
            "txt" | "text" => Ok(SourceFormat::Txt),
            other => Err(ParseError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Parse a bookmark file into ordered entries.
///
/// Fails when the content is malformed or holds no entries at all.
pub fn parse_bookmark_source(content: &str, format: SourceFormat) -> Result<Vec<SourceEntry>, ParseError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let entries = match format {
        SourceFormat::Json => parse_json(content)?,
        SourceFormat::Csv => parse_csv(content)?,
        SourceFormat::Txt => parse_txt(content),
    };
    if entries.is_empty() {
        return Err(ParseError::Empty("bookmark file"));
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    List(Vec<JsonItem>),
    Wrapped { bookmarks: Vec<JsonItem> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonItem {
    Title(String),
    Entry(JsonEntry),
}

#[derive(Debug, Deserialize)]
struct JsonEntry {
    title: String,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    level: Option<u8>,
    #[serde(default)]
    children: Vec<JsonItem>,
}

fn parse_json(content: &str) -> Result<Vec<SourceEntry>, ParseError> {
    let items = match serde_json::from_str::<JsonDocument>(content)? {
        JsonDocument::List(items) | JsonDocument::Wrapped { bookmarks: items } => items,
    };
    let mut out = Vec::new();
    flatten_json(items, 1, false, &mut out);
    Ok(out)
}

fn flatten_json(items: Vec<JsonItem>, depth: u8, nested: bool, out: &mut Vec<SourceEntry>) {
    let implied = nested.then_some(depth);
    for item in items {
        match item {
            JsonItem::Title(title) => {
                if !title.trim().is_empty() {
                    out.push(SourceEntry {
                        title: title.trim().to_string(),
                        level: implied,
                        page: None,
                    });
                }
            }
            JsonItem::Entry(entry) => {
                if !entry.title.trim().is_empty() {
                    out.push(SourceEntry {
                        title: entry.title.trim().to_string(),
                        level: entry.level.filter(|l| *l > 0).or(implied),
                        page: entry.page.filter(|p| *p > 0),
                    });
                }
                flatten_json(entry.children, depth.saturating_add(1), true, out);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

struct Columns {
    title: usize,
    page: Option<usize>,
    level: Option<usize>,
}

fn parse_csv(content: &str) -> Result<Vec<SourceEntry>, ParseError> {
    let mut records = csv_records(content)?.into_iter().peekable();

    let header = records.peek().and_then(|(_, fields)| header_columns(fields));
    let columns = match header {
        Some(columns) => {
            records.next();
            columns
        }
        None => Columns {
            title: 0,
            page: Some(1),
            level: Some(2),
        },
    };

    let mut out = Vec::new();
    for (line, fields) in records {
        let raw_title = fields.get(columns.title).map(String::as_str).unwrap_or("");
        let title = raw_title.trim();
        if title.is_empty() {
            continue;
        }
        let page = numeric_field(&fields, columns.page, line, "page")?;
        let level = numeric_field(&fields, columns.level, line, "level")?
            .map(|l| u8::try_from(l).unwrap_or(u8::MAX))
            .or_else(|| Some(indent_level(raw_title, 2)));

        out.push(SourceEntry {
            title: title.to_string(),
            level,
            page,
        });
    }
    Ok(out)
}

fn header_columns(fields: &[String]) -> Option<Columns> {
    let names: Vec<String> = fields.iter().map(|f| f.trim().to_ascii_lowercase()).collect();
    let find = |candidates: &[&str]| names.iter().position(|n| candidates.contains(&n.as_str()));
    Some(Columns {
        title: find(&["title", "name", "heading"])?,
        page: find(&["page", "page_number", "pagenumber"]),
        level: find(&["level", "depth"]),
    })
}

fn numeric_field(
    fields: &[String],
    column: Option<usize>,
    line: usize,
    field: &'static str,
) -> Result<Option<u32>, ParseError> {
    let Some(raw) = column.and_then(|c| fields.get(c)).map(|f| f.trim()) else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<u32>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ParseError::InvalidField {
            line,
            field,
            value: raw.to_string(),
        }),
    }
}

/// Split CSV content into `(starting line, fields)` records. Quoted fields may
/// contain commas, doubled quotes and newlines.
pub fn csv_records(content: &str) -> Result<Vec<(usize, Vec<String>)>, ParseError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut record_line = 1usize;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                push_record(&mut records, record_line, std::mem::take(&mut record));
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ParseError::Csv {
            line: record_line,
            message: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        push_record(&mut records, record_line, record);
    }
    Ok(records)
}

fn push_record(records: &mut Vec<(usize, Vec<String>)>, line: usize, record: Vec<String>) {
    if record.iter().any(|f| !f.trim().is_empty()) {
        records.push((line, record));
    }
}

// ---------------------------------------------------------------------------
// TXT
// ---------------------------------------------------------------------------

fn parse_txt(content: &str) -> Vec<SourceEntry> {
    let unit = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| *c == ' ').count())
        .filter(|n| *n > 0)
        .min()
        .unwrap_or(2);

    let mut out = Vec::new();
    for raw in content.lines() {
        let body = raw.trim();
        if body.is_empty() || body.chars().all(|c| matches!(c, '=' | '-' | '*' | '_')) {
            continue;
        }

        let mut title = body.to_string();
        let mut level = Some(indent_level(raw, unit));
        let mut page = None;

        if let Some(caps) = TXT_ANNOTATION.captures(body) {
            let declared_level = caps.get(2).and_then(|m| m.as_str().parse::<u8>().ok());
            let declared_page = caps.get(3).and_then(|m| m.as_str().parse::<u32>().ok());
            if declared_level.is_some() || declared_page.is_some() {
                title = caps[1].trim().to_string();
                level = declared_level.filter(|l| *l > 0).or(level);
                page = declared_page.filter(|p| *p > 0);
            }
        } else if let Some(caps) = TXT_TOC_TAIL.captures(body) {
            title = caps[1].trim().to_string();
            page = caps[2].parse::<u32>().ok().filter(|p| *p > 0);
        }

        if !title.is_empty() {
            out.push(SourceEntry { title, level, page });
        }
    }
    out
}

/// Level implied by leading whitespace: one per tab, one per `unit` spaces.
fn indent_level(raw: &str, unit: usize) -> u8 {
    let mut tabs = 0usize;
    let mut spaces = 0usize;
    for c in raw.chars() {
        match c {
            '\t' => tabs += 1,
            ' ' => spaces += 1,
            _ => break,
        }
    }
    let depth = tabs + spaces / unit.max(1);
    u8::try_from(depth + 1).unwrap_or(u8::MAX)
}
