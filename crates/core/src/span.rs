//! Text spans as produced by the span extractor, plus the text normalisation
//! helpers every later stage shares.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Axis-aligned box in PDF user space (origin bottom-left, y grows upward).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// One run of text laid out on a page.
///
/// `page` is 0-based. `x` and `y` are the baseline origin of the run in user
/// space, so a larger `y` is closer to the top of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub page: usize,
    pub font_name: String,
    pub font_size: f32,
    pub is_bold: bool,
    pub is_italic: bool,
    pub x: f32,
    pub y: f32,
    pub bbox: Rect,
}

impl TextSpan {
    /// The span text after [`clean_text`].
    pub fn cleaned_text(&self) -> String {
        clean_text(&self.text)
    }
}

/// NFKC-normalise, collapse internal whitespace runs to one space and trim.
pub fn clean_text(text: &str) -> String {
    let normalized: String = text.nfkc().collect();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison key used for matching titles against page text: cleaned,
/// lower-cased, with common ASCII and CJK punctuation removed.
pub fn match_key(text: &str) -> String {
    let lowered = clean_text(text).to_lowercase();
    let stripped: String = lowered.chars().filter(|c| !is_match_punctuation(*c)).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_match_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c,
            '，' | '。' | '、' | '；' | '：' | '？' | '！' | '“' | '”' | '‘' | '’' | '（' | '）'
                | '【' | '】' | '《' | '》' | '…' | '—' | '·'
        )
}

/// Quantisation bucket width for font sizes (points).
pub const FONT_SIZE_BUCKET: f32 = 0.5;

/// Quantise a font size into its bucket.
pub fn bucket_font_size(size: f32) -> f32 {
    (size / FONT_SIZE_BUCKET).round() * FONT_SIZE_BUCKET
}

/// Integer key for a bucketed font size, usable in ordered maps.
pub fn bucket_key(size: f32) -> i32 {
    (bucket_font_size(size) * 100.0).round() as i32
}

/// Reading order: page, then top to bottom, then left to right.
pub fn document_order(a: &TextSpan, b: &TextSpan) -> Ordering {
    a.page
        .cmp(&b.page)
        .then(b.y.partial_cmp(&a.y).unwrap_or(Ordering::Equal))
        .then(a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
}
