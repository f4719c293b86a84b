//! Candidate filter: narrows the full span sequence down to heading candidates.
//!
//! Rules are evaluated per span in a fixed precedence:
//!
//! 1. empty text and page furniture are always rejected;
//! 2. an `include_titles` hit always keeps the span;
//! 3. the document's own title is rejected;
//! 4. an `exclude_titles` hit rejects it;
//! 5. obvious non-titles (page numbers, URLs, punctuation runs) are rejected;
//! 6. spans below the font threshold are rejected (the bound is inclusive);
//! 7. spans off the heading column of their font-size cluster are rejected;
//! 8. spans without a numbering prefix are rejected when one is required.
//!
//! The filter is a pure function of its inputs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::numbering::{parse_prefix, strip_prefix, NumberingPrefix};
use crate::span::{bucket_key, clean_text, document_order, TextSpan};

static PAGE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:page\s*)?[-–—\s]*\d{1,4}[-–—\s]*(?:(?:of|/)\s*\d{1,4})?$").unwrap()
});

static URL_OR_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://|www\.|\S+@\S+\.\S+").unwrap());

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Thresholds for recognising running headers, footers and page numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FurnitureConfig {
    /// Minimum number of distinct pages the same text must recur on.
    pub min_pages: usize,
    /// Maximum distance (points, on each axis) between recurrences.
    pub position_tolerance: f32,
}

impl Default for FurnitureConfig {
    fn default() -> Self {
        Self {
            min_pages: 3,
            position_tolerance: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterConfig {
    pub font_threshold_enabled: bool,
    pub font_threshold: f32,
    pub x_filter_enabled: bool,
    pub x_tolerance: f32,
    pub require_numeric_start: bool,
    pub exclude_titles: BTreeSet<String>,
    pub include_titles: BTreeSet<String>,
    /// Reject text that cannot plausibly be a title.
    pub skip_non_titles: bool,
    /// Reject every span repeating the text of [`detect_document_title`].
    pub exclude_document_title: bool,
    pub furniture: FurnitureConfig,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            font_threshold_enabled: false,
            font_threshold: 0.0,
            x_filter_enabled: true,
            x_tolerance: 5.0,
            require_numeric_start: false,
            exclude_titles: BTreeSet::new(),
            include_titles: BTreeSet::new(),
            skip_non_titles: true,
            exclude_document_title: true,
            furniture: FurnitureConfig::default(),
        }
    }
}

impl FilterConfig {
    /// Replace the exclude list, cleaning every entry the same way span text is
    /// cleaned before comparison.
    pub fn with_exclude_titles<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude_titles = clean_titles(titles);
        self
    }

    pub fn with_include_titles<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.include_titles = clean_titles(titles);
        self
    }

    pub fn with_font_threshold(mut self, threshold: f32) -> Self {
        self.font_threshold_enabled = true;
        self.font_threshold = threshold;
        self
    }
}

fn clean_titles<I, S>(titles: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    titles
        .into_iter()
        .map(|t| clean_text(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// A span promoted to heading candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadingCandidate {
    pub span: TextSpan,
    /// The cleaned span text.
    pub text: String,
    pub prefix: Option<NumberingPrefix>,
    /// Assigned by the level classifier.
    pub level: Option<u8>,
    /// Kept because of an `include_titles` hit.
    pub forced: bool,
}

impl HeadingCandidate {
    /// Numeric components of the numbering prefix, empty when unnumbered.
    pub fn numeric_prefix(&self) -> &[u32] {
        self.prefix.as_ref().map(|p| p.numbers.as_slice()).unwrap_or(&[])
    }
}

/// Why a span did not become a candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum Rejection {
    Empty,
    Furniture,
    DocumentTitle,
    Excluded,
    NotTitleLike,
    BelowFontThreshold { size: f32, threshold: f32 },
    OffColumn { x: f32, column: f32 },
    NoNumericStart,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Empty => write!(f, "empty text"),
            Rejection::Furniture => write!(f, "page furniture"),
            Rejection::DocumentTitle => write!(f, "document title"),
            Rejection::Excluded => write!(f, "excluded title"),
            Rejection::NotTitleLike => write!(f, "not title-like"),
            Rejection::BelowFontThreshold { size, threshold } => {
                write!(f, "font size {size:.1} below threshold {threshold:.1}")
            }
            Rejection::OffColumn { x, column } => write!(f, "x {x:.1} off heading column {column:.1}"),
            Rejection::NoNumericStart => write!(f, "no numbering prefix"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub candidates: Vec<HeadingCandidate>,
    /// `(index into the input spans, reason)` for every rejected span.
    pub rejections: Vec<(usize, Rejection)>,
    /// The title that was filtered out, if one was detected.
    pub document_title: Option<String>,
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

enum Verdict {
    Reject(Rejection),
    Force,
    Pending,
}

struct Assessed {
    text: String,
    prefix: Option<NumberingPrefix>,
    verdict: Verdict,
}

/// Apply every filter rule to `spans` (expected in document order).
pub fn filter_candidates(spans: &[TextSpan], config: &FilterConfig) -> FilterOutcome {
    let furniture = detect_furniture(spans, &config.furniture);
    let title = if config.exclude_document_title {
        detect_document_title(spans)
    } else {
        None
    };

    let assessed: Vec<Assessed> = spans
        .iter()
        .enumerate()
        .map(|(i, span)| assess(i, span, config, &furniture, title.as_deref()))
        .collect();

    let columns = if config.x_filter_enabled {
        heading_columns(spans, &assessed)
    } else {
        BTreeMap::new()
    };

    let mut outcome = FilterOutcome {
        document_title: title,
        ..FilterOutcome::default()
    };
    for (i, (span, assessed)) in spans.iter().zip(assessed).enumerate() {
        let forced = match assessed.verdict {
            Verdict::Reject(reason) => {
                outcome.rejections.push((i, reason));
                continue;
            }
            Verdict::Force => true,
            Verdict::Pending => {
                if let Some(&column) = columns.get(&bucket_key(span.font_size)) {
                    if (span.x - column).abs() > config.x_tolerance {
                        outcome
                            .rejections
                            .push((i, Rejection::OffColumn { x: span.x, column }));
                        continue;
                    }
                }
                if config.require_numeric_start && assessed.prefix.is_none() {
                    outcome.rejections.push((i, Rejection::NoNumericStart));
                    continue;
                }
                false
            }
        };

        outcome.candidates.push(HeadingCandidate {
            span: span.clone(),
            text: assessed.text,
            prefix: assessed.prefix,
            level: None,
            forced,
        });
    }

    outcome
        .candidates
        .sort_by(|a, b| document_order(&a.span, &b.span));
    outcome
}

fn assess(
    index: usize,
    span: &TextSpan,
    config: &FilterConfig,
    furniture: &BTreeSet<usize>,
    title: Option<&str>,
) -> Assessed {
    let text = span.cleaned_text();
    let prefix = parse_prefix(&text);

    let verdict = if text.is_empty() {
        Verdict::Reject(Rejection::Empty)
    } else if furniture.contains(&index) {
        Verdict::Reject(Rejection::Furniture)
    } else {
        let stripped = strip_prefix(&text);
        let listed = |set: &BTreeSet<String>| set.contains(&text) || set.contains(&stripped);

        if listed(&config.include_titles) {
            Verdict::Force
        } else if title == Some(text.as_str()) {
            Verdict::Reject(Rejection::DocumentTitle)
        } else if listed(&config.exclude_titles) {
            Verdict::Reject(Rejection::Excluded)
        } else if config.skip_non_titles && !looks_like_title(&text, &stripped) {
            Verdict::Reject(Rejection::NotTitleLike)
        } else if config.font_threshold_enabled && span.font_size < config.font_threshold {
            Verdict::Reject(Rejection::BelowFontThreshold {
                size: span.font_size,
                threshold: config.font_threshold,
            })
        } else {
            Verdict::Pending
        }
    };

    Assessed { text, prefix, verdict }
}

/// Heading start column per font-size bucket.
///
/// The column is the most common x among numbered spans of the bucket that
/// survived the earlier rules (earliest wins ties). A bucket with no numbered
/// spans takes the x of its first surviving span.
fn heading_columns(spans: &[TextSpan], assessed: &[Assessed]) -> BTreeMap<i32, f32> {
    // bucket -> x key -> (count, first index, x)
    let mut numbered: BTreeMap<i32, BTreeMap<i32, (usize, usize, f32)>> = BTreeMap::new();
    let mut first_seen: BTreeMap<i32, f32> = BTreeMap::new();

    for (i, (span, a)) in spans.iter().zip(assessed).enumerate() {
        if !matches!(a.verdict, Verdict::Pending) {
            continue;
        }
        let bucket = bucket_key(span.font_size);
        first_seen.entry(bucket).or_insert(span.x);
        if a.prefix.is_some() {
            let x_key = (span.x * 2.0).round() as i32;
            let slot = numbered
                .entry(bucket)
                .or_default()
                .entry(x_key)
                .or_insert((0, i, span.x));
            slot.0 += 1;
        }
    }

    first_seen
        .into_iter()
        .map(|(bucket, first_x)| {
            let column = numbered
                .get(&bucket)
                .and_then(|xs| {
                    xs.values()
                        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
                        .map(|(_, _, x)| *x)
                })
                .unwrap_or(first_x);
            (bucket, column)
        })
        .collect()
}

/// The document's own title, as cleaned text.
///
/// That is the one span set in the largest font size, provided it sits on
/// the first page and has no numbering prefix. A size shared by several
/// spans belongs to headings, not to a title.
pub fn detect_document_title(spans: &[TextSpan]) -> Option<String> {
    let sized: Vec<(&TextSpan, String)> = spans
        .iter()
        .filter(|s| s.font_size > 0.0)
        .map(|s| (s, s.cleaned_text()))
        .filter(|(_, text)| !text.is_empty())
        .collect();
    let largest = sized.iter().map(|(s, _)| bucket_key(s.font_size)).max()?;

    let mut top = sized.into_iter().filter(|(s, _)| bucket_key(s.font_size) == largest);
    let (span, text) = top.next()?;
    if top.next().is_some() || span.page != 0 || parse_prefix(&text).is_some() {
        return None;
    }
    Some(text)
}

/// Indices of spans that are running headers, footers or page numbers.
pub fn detect_furniture(spans: &[TextSpan], config: &FurnitureConfig) -> BTreeSet<usize> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, span) in spans.iter().enumerate() {
        let text = span.cleaned_text();
        if text.is_empty() {
            continue;
        }
        let key = if PAGE_NUMBER.is_match(&text) {
            "\u{0}page-number".to_string()
        } else {
            text
        };
        groups.entry(key).or_default().push(i);
    }

    let mut furniture = BTreeSet::new();
    for members in groups.values() {
        let pages: BTreeSet<usize> = members.iter().map(|&i| spans[i].page).collect();
        if pages.len() < config.min_pages {
            continue;
        }
        for &i in members {
            let anchor = &spans[i];
            let recurring: BTreeSet<usize> = members
                .iter()
                .map(|&j| &spans[j])
                .filter(|other| {
                    (other.x - anchor.x).abs() <= config.position_tolerance
                        && (other.y - anchor.y).abs() <= config.position_tolerance
                })
                .map(|other| other.page)
                .collect();
            if recurring.len() >= config.min_pages {
                furniture.insert(i);
            }
        }
    }
    furniture
}

/// Cheap plausibility check for heading text.
///
/// `stripped` is the text without its numbering prefix; punctuation is
/// counted there so deep numbering like `1.2.3.4` does not count against it.
pub fn looks_like_title(text: &str, stripped: &str) -> bool {
    if text.chars().count() < 2 {
        return false;
    }
    if text.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) {
        return false;
    }
    if text
        .chars()
        .all(|c| !c.is_alphanumeric() || c.is_whitespace())
    {
        return false;
    }
    let punctuation = stripped
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    if punctuation > 4 {
        return false;
    }
    !URL_OR_EMAIL.is_match(text)
}
