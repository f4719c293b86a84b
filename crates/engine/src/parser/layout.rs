//! Span extraction: from content-stream operators to [`TextSpan`]s.
//!
//! ```text
//! content ops  ->  GlyphRun[]  ->  TextSpan[]
//!   (per page)     PageScanner      merge_runs
//! ```
//!
//! `PageScanner` tracks the PDF text state and the current transformation
//! matrix while it walks one page, emitting a [`GlyphRun`] in user space for
//! every shown string. `merge_runs` then groups runs into
//! baselines and joins neighbouring runs of the same size, so a bold "1.1"
//! followed by a regular "Background" becomes a single span.

use pdfmark_core::span::{bucket_key, Rect, TextSpan};

use super::backend::{get_number_from_value, BackendFontInfo, ContentOp, FontDecoder, PageId, PdfBackend, PdfValue};
use crate::PdfError;

/// A string shown by a single text operator, before line merging.
#[derive(Debug, Clone)]
pub struct GlyphRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub font_size: f32,
    pub font_name: String,
    pub is_bold: bool,
    pub is_italic: bool,
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Two runs whose baselines differ by at most this share a line.
const Y_TOLERANCE: f32 = 1.0;

/// Approximate glyph width as a fraction of font size. There are no glyph
/// metrics at this level.
const APPROX_CHAR_WIDTH_RATIO: f32 = 0.5;

/// Minimum gap (in points) between adjacent runs before a space is inserted.
const MIN_WORD_GAP: f32 = 1.5;

/// Runs further apart than this many font sizes are separate spans.
const MAX_MERGE_GAP_FACTOR: f32 = 2.0;

/// Ascent and descent as fractions of the font size, for bounding boxes.
const ASCENT: f32 = 0.8;
const DESCENT: f32 = 0.2;

/// The identity 2x3 matrix: [a, b, c, d, tx, ty].
const IDENTITY_MATRIX: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `lhs × rhs` for PDF matrices, which act on row vectors: `[x y 1] × M`.
fn multiply(lhs: &[f32; 6], rhs: &[f32; 6]) -> [f32; 6] {
    [
        lhs[0] * rhs[0] + lhs[1] * rhs[2],
        lhs[0] * rhs[1] + lhs[1] * rhs[3],
        lhs[2] * rhs[0] + lhs[3] * rhs[2],
        lhs[2] * rhs[1] + lhs[3] * rhs[3],
        lhs[4] * rhs[0] + lhs[5] * rhs[2] + rhs[4],
        lhs[4] * rhs[1] + lhs[5] * rhs[3] + rhs[5],
    ]
}

fn matrix_operands(operands: &[PdfValue]) -> Option<[f32; 6]> {
    let vals: Vec<f32> = operands.iter().take(6).filter_map(get_number_from_value).collect();
    match vals[..] {
        [a, b, c, d, e, f] => Some([a, b, c, d, e, f]),
        _ => None,
    }
}

/// Returns `true` if `c` belongs to a script that does not use inter-word
/// spaces (CJK ideographs, kana, Hangul, Thai and neighbours).
pub fn is_spaceless_script_char(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF
        | 0x3400..=0x4DBF
        | 0x20000..=0x2A6DF
        | 0xF900..=0xFAFF
        | 0x3040..=0x309F
        | 0x30A0..=0x30FF
        | 0x31F0..=0x31FF
        | 0xAC00..=0xD7AF
        | 0x1100..=0x11FF
        | 0x3130..=0x318F
        | 0x3000..=0x303F
        | 0xFF00..=0xFFEF
        | 0x0E00..=0x0EFF
        | 0x1000..=0x109F
        | 0x1780..=0x17FF
        | 0x0F00..=0x0FFF
    )
}

// ---------------------------------------------------------------------------
// Text state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct TextState {
    /// Resource key of the current font (`F1`), not its base name.
    font_key: Vec<u8>,
    font_name: String,
    font_size: f32,
    text_matrix: [f32; 6],
    /// Set by BT and updated by Td/TD/T*/Tm.
    line_matrix: [f32; 6],
    /// Tz as a fraction.
    horiz_scale: f32,
    char_spacing: f32,
    word_spacing: f32,
    text_rise: f32,
    leading: f32,
    is_bold: bool,
    is_italic: bool,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_key: Vec::new(),
            font_name: String::new(),
            font_size: 0.0,
            text_matrix: IDENTITY_MATRIX,
            line_matrix: IDENTITY_MATRIX,
            horiz_scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            text_rise: 0.0,
            leading: 0.0,
            is_bold: false,
            is_italic: false,
        }
    }
}

impl TextState {
    fn glyph_width(&self) -> f32 {
        self.font_size * APPROX_CHAR_WIDTH_RATIO * self.horiz_scale
    }

    fn estimate_width(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.glyph_width()
    }

    fn advance_x(&mut self, dx: f32) {
        self.text_matrix[4] += dx * self.text_matrix[0];
        self.text_matrix[5] += dx * self.text_matrix[1];
    }

    /// Advance past `text` as if it had been painted.
    fn advance_after_show(&mut self, text: &str) {
        let dx: f32 = text
            .chars()
            .map(|ch| {
                let spacing = if ch == ' ' { self.word_spacing } else { 0.0 };
                self.glyph_width() + self.char_spacing + spacing
            })
            .sum();
        self.advance_x(dx);
    }

    /// Td / TD: translate the line matrix and restart the text matrix there.
    fn translate_line(&mut self, tx: f32, ty: f32) {
        let m = self.line_matrix;
        self.line_matrix[4] = m[0] * tx + m[2] * ty + m[4];
        self.line_matrix[5] = m[1] * tx + m[3] * ty + m[5];
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.translate_line(0.0, -self.leading);
    }

    fn set_font(&mut self, key: Vec<u8>, base_font: &str, size: f32) {
        let upper = base_font.to_uppercase();
        self.font_key = key;
        self.font_size = size;
        self.is_bold = upper.contains("BOLD") || upper.contains("HEAVY") || upper.contains("BLACK");
        self.is_italic = upper.contains("ITALIC") || upper.contains("OBLIQUE");
        self.font_name = base_font.to_string();
    }
}

// ---------------------------------------------------------------------------
// Page scanner
// ---------------------------------------------------------------------------

/// Walks one page's operators, handling:
///
/// | Operator | Action |
/// |----------|--------|
/// | `q` `Q` `cm` | Save, restore and concatenate the CTM |
/// | `BT`     | Begin text object, reset matrices |
/// | `Tf`     | Set font and size |
/// | `Tm`     | Set text matrix |
/// | `Td` `TD` `T*` `TL` | Line positioning and leading |
/// | `Tc` `Tw` `Tz` `Ts` | Spacing, scaling, rise |
/// | `Tj` `TJ` `'` `"`   | Show text |
struct PageScanner<'a> {
    backend: &'a dyn PdfBackend,
    page_id: PageId,
    fonts: Vec<BackendFontInfo>,
    decoder: FontDecoder<'a>,
    state: TextState,
    /// Current transformation matrix, text space excluded.
    ctm: [f32; 6],
    ctm_stack: Vec<[f32; 6]>,
    runs: Vec<GlyphRun>,
}

impl<'a> PageScanner<'a> {
    fn new(backend: &'a dyn PdfBackend, page_id: PageId) -> Self {
        Self {
            backend,
            page_id,
            // A page without a usable font dictionary still has text.
            fonts: backend.page_fonts(page_id).unwrap_or_default(),
            decoder: FontDecoder::Plain,
            state: TextState::default(),
            ctm: IDENTITY_MATRIX,
            ctm_stack: Vec::new(),
            runs: Vec::new(),
        }
    }

    fn apply(&mut self, op: &ContentOp) {
        let first = op.operands.first();
        let number = |i: usize| op.operands.get(i).and_then(get_number_from_value);

        match op.operator.as_str() {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                // An unbalanced Q leaves the CTM alone.
                if let Some(ctm) = self.ctm_stack.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = matrix_operands(&op.operands) {
                    self.ctm = multiply(&m, &self.ctm);
                }
            }
            "BT" => {
                self.state.text_matrix = IDENTITY_MATRIX;
                self.state.line_matrix = IDENTITY_MATRIX;
            }
            "Tf" => self.set_font(&op.operands),
            "Tm" => {
                if let Some(m) = matrix_operands(&op.operands) {
                    self.state.text_matrix = m;
                    self.state.line_matrix = m;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                    self.state.translate_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (number(0), number(1)) {
                    self.state.leading = -ty;
                    self.state.translate_line(tx, ty);
                }
            }
            "T*" => self.state.next_line(),
            "TL" => {
                if let Some(v) = number(0) {
                    self.state.leading = v;
                }
            }
            "Tc" => {
                if let Some(v) = number(0) {
                    self.state.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = number(0) {
                    self.state.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = number(0) {
                    self.state.horiz_scale = v / 100.0;
                }
            }
            "Ts" => {
                if let Some(v) = number(0) {
                    self.state.text_rise = v;
                }
            }
            "Tj" => {
                if let Some(operand) = first {
                    self.show(operand);
                }
            }
            "TJ" => {
                if let Some(PdfValue::Array(elements)) = first {
                    self.show_array(elements);
                }
            }
            "'" => {
                self.state.next_line();
                if let Some(operand) = first {
                    self.show(operand);
                }
            }
            "\"" => {
                if let (Some(aw), Some(ac), Some(operand)) = (number(0), number(1), op.operands.get(2)) {
                    self.state.word_spacing = aw;
                    self.state.char_spacing = ac;
                    self.state.next_line();
                    self.show(operand);
                }
            }
            _ => {}
        }
    }

    fn set_font(&mut self, operands: &[PdfValue]) {
        let key = match operands.first() {
            Some(PdfValue::Name(n)) | Some(PdfValue::Str(n)) => n.clone(),
            _ => return,
        };
        let size = operands.get(1).and_then(get_number_from_value).unwrap_or(0.0);
        let base = self
            .fonts
            .iter()
            .find(|info| info.name == key)
            .and_then(|info| info.base_font.clone())
            .unwrap_or_else(|| String::from_utf8_lossy(&key).into_owned());
        self.decoder = self.backend.font_decoder(self.page_id, &key);
        self.state.set_font(key, &base, size);
    }

    fn decode(&self, value: &PdfValue) -> String {
        match value {
            PdfValue::Str(bytes) => self.decoder.decode(bytes),
            _ => String::new(),
        }
    }

    /// Tj and friends: one run per string.
    fn show(&mut self, operand: &PdfValue) {
        let text = self.decode(operand);
        if text.is_empty() {
            return;
        }
        let start = self.state.text_matrix;
        self.push_run(&text, &start);
        self.state.advance_after_show(&text);
    }

    /// TJ: strings interleaved with kerning adjustments in thousandths of a
    /// text-space unit. A kern wide enough to read as a word gap becomes a
    /// space.
    fn show_array(&mut self, elements: &[PdfValue]) {
        let mut buf = String::new();
        let mut start = self.state.text_matrix;

        for element in elements {
            if let PdfValue::Str(_) = element {
                let fragment = self.decode(element);
                if buf.is_empty() {
                    start = self.state.text_matrix;
                }
                buf.push_str(&fragment);
                self.state.advance_after_show(&fragment);
            } else if let Some(adj) = get_number_from_value(element) {
                let dx = -adj / 1000.0 * self.state.font_size * self.state.horiz_scale;
                if dx > self.state.glyph_width() * 0.3 && !buf.is_empty() {
                    buf.push(' ');
                }
                self.state.advance_x(dx);
            }
        }

        let text = buf.trim_end();
        if !text.is_empty() {
            self.push_run(text, &start);
        }
    }

    /// Record `text` shown from the text matrix `start`, mapped to user
    /// space through the CTM.
    fn push_run(&mut self, text: &str, start: &[f32; 6]) {
        let m = multiply(start, &self.ctm);
        let rise = self.state.text_rise;
        let x_scale = (m[0].powi(2) + m[1].powi(2)).sqrt();
        let y_scale = (m[2].powi(2) + m[3].powi(2)).sqrt();
        self.runs.push(GlyphRun {
            text: text.to_string(),
            x: m[2] * rise + m[4],
            y: m[3] * rise + m[5],
            width: self.state.estimate_width(text) * x_scale,
            font_size: (self.state.font_size * y_scale).abs(),
            font_name: self.state.font_name.clone(),
            is_bold: self.state.is_bold,
            is_italic: self.state.is_italic,
        });
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Every run shown on one page, in content-stream order.
pub fn extract_page_runs(backend: &dyn PdfBackend, page_id: PageId) -> Result<Vec<GlyphRun>, PdfError> {
    let raw_content = backend.page_content(page_id)?;
    let ops = backend.decode_content(&raw_content)?;

    let mut scanner = PageScanner::new(backend, page_id);
    for op in &ops {
        scanner.apply(op);
    }
    Ok(scanner.runs)
}

/// Group runs into baselines and merge neighbours of the same size bucket.
///
/// The result is in reading order: top to bottom, then left to right. Font
/// name and style of a merged span come from its first run.
pub fn merge_runs(mut runs: Vec<GlyphRun>, page: usize) -> Vec<TextSpan> {
    runs.retain(|r| !r.text.trim().is_empty());
    runs.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut spans = Vec::with_capacity(runs.len());
    let mut line: Vec<GlyphRun> = Vec::new();
    for run in runs {
        if line.first().is_some_and(|first| (first.y - run.y).abs() > Y_TOLERANCE) {
            spans.extend(merge_line(std::mem::take(&mut line), page));
        }
        line.push(run);
    }
    spans.extend(merge_line(line, page));
    spans
}

fn merge_line(mut runs: Vec<GlyphRun>, page: usize) -> Vec<TextSpan> {
    runs.sort_by(|a, b| a.x.total_cmp(&b.x));

    let mut merged: Vec<GlyphRun> = Vec::with_capacity(runs.len());
    for run in runs {
        if let Some(prev) = merged.last_mut() {
            let gap = run.x - (prev.x + prev.width);
            let same_size = bucket_key(prev.font_size) == bucket_key(run.font_size);
            if same_size && gap > -prev.font_size && gap < prev.font_size * MAX_MERGE_GAP_FACTOR {
                if gap >= MIN_WORD_GAP && !boundary_is_spaceless(prev, &run) {
                    prev.text.push(' ');
                }
                prev.text.push_str(&run.text);
                prev.width = (run.x + run.width) - prev.x;
                continue;
            }
        }
        merged.push(run);
    }

    merged
        .into_iter()
        .map(|run| TextSpan {
            bbox: Rect {
                x0: run.x,
                y0: run.y - run.font_size * DESCENT,
                x1: run.x + run.width,
                y1: run.y + run.font_size * ASCENT,
            },
            text: run.text.trim().to_string(),
            page,
            font_name: run.font_name,
            font_size: run.font_size,
            is_bold: run.is_bold,
            is_italic: run.is_italic,
            x: run.x,
            y: run.y,
        })
        .collect()
}

fn boundary_is_spaceless(prev: &GlyphRun, next: &GlyphRun) -> bool {
    match (prev.text.chars().next_back(), next.text.chars().next()) {
        (Some(l), Some(f)) => is_spaceless_script_char(l) && is_spaceless_script_char(f),
        _ => false,
    }
}

/// Spans of one page. `page` is 0-based.
pub fn extract_page_spans(backend: &dyn PdfBackend, page: usize, page_id: PageId) -> Result<Vec<TextSpan>, PdfError> {
    Ok(merge_runs(extract_page_runs(backend, page_id)?, page))
}

/// Lazy, page-ordered span extraction. Yields `(0-based page, spans)`; each
/// call to [`iter_pages`] starts again from the first page.
pub struct PageSpans<'a> {
    backend: &'a dyn PdfBackend,
    pages: std::iter::Enumerate<std::collections::btree_map::IntoValues<u32, PageId>>,
}

impl Iterator for PageSpans<'_> {
    type Item = Result<(usize, Vec<TextSpan>), PdfError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, page_id) = self.pages.next()?;
        Some(extract_page_spans(self.backend, index, page_id).map(|spans| (index, spans)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pages.size_hint()
    }
}

pub fn iter_pages(backend: &dyn PdfBackend) -> PageSpans<'_> {
    PageSpans {
        backend,
        pages: backend.pages().into_values().enumerate(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
