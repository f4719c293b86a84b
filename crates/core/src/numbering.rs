//! Leading numbering prefixes such as `1.2`, `Chapter 3`, `A.` or `第2章`.
//!
//! A prefix is what makes a heading "numbered". Some prefix kinds also carry a
//! structural depth (`1.2.3` sits three levels deep) which the level
//! classifier trusts over font sizes.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3}(?:\.\d{1,3})*)(\.)?(\s*)").unwrap());

static KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(chapter|chap\.|part|section|appendix)\s+(\d{1,3}|[ivxlcdm]{1,7}|[a-z])\b\s*[.:：\-]?\s*")
        .unwrap()
});

static CJK_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^第\s*([0-9一二三四五六七八九十百零〇两]+)\s*(章|节|節|部分|部|篇)\s*[：:、.]?\s*").unwrap()
});

static CJK_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([一二三四五六七八九十百零]+)\s*[、.．]\s*").unwrap());

static ROMAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([IVXLCDM]{1,7})[.)]\s+").unwrap());

static LETTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Za-z])[.)]\s+").unwrap());

static PARENTHESIZED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[(（]\s*(\d{1,3}|[一二三四五六七八九十]+|[a-zA-Z])\s*[)）]\s*").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrefixKind {
    /// `1`, `1.`, `1.2`, `1.2.3`
    Decimal,
    /// `Chapter 3`, `Appendix B`
    Chapter,
    /// `Part II`
    Part,
    /// `Section 4`
    Section,
    /// `第3章`, `第2部分`
    CjkChapter,
    /// `第3节`
    CjkSection,
    /// `三、`
    CjkOrdinal,
    /// `IV.`
    Roman,
    /// `A.`, `b)`
    Letter,
    /// `(2)`, `（三）`
    Parenthesized,
}

/// A parsed numbering prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingPrefix {
    pub kind: PrefixKind,
    /// Numeric components, e.g. `[1, 2]` for `1.2`. Letters map to their
    /// alphabet ordinal and roman numerals to their value.
    pub numbers: Vec<u32>,
    /// Byte length of the prefix in the source text, separators included.
    pub len: usize,
}

impl NumberingPrefix {
    /// Structural nesting depth implied by the prefix, if the kind has one.
    pub fn depth(&self) -> Option<u8> {
        match self.kind {
            PrefixKind::Decimal => Some(self.numbers.len().min(u8::MAX as usize) as u8),
            PrefixKind::Chapter | PrefixKind::Part | PrefixKind::CjkChapter | PrefixKind::CjkOrdinal => {
                Some(1)
            }
            PrefixKind::CjkSection => Some(2),
            PrefixKind::Section | PrefixKind::Roman | PrefixKind::Letter | PrefixKind::Parenthesized => None,
        }
    }
}

/// Parse the numbering prefix at the start of `text` (which should already be
/// cleaned of leading whitespace).
pub fn parse_prefix(text: &str) -> Option<NumberingPrefix> {
    parse_decimal(text)
        .or_else(|| parse_keyword(text))
        .or_else(|| parse_cjk_heading(text))
        .or_else(|| parse_cjk_ordinal(text))
        .or_else(|| parse_roman_or_letter(text))
        .or_else(|| parse_parenthesized(text))
}

/// Remove the numbering prefix from `text`. Text that would become empty is
/// returned unchanged.
pub fn strip_prefix(text: &str) -> String {
    let trimmed = text.trim();
    match parse_prefix(trimmed) {
        Some(prefix) => {
            let rest = trimmed[prefix.len..].trim();
            if rest.is_empty() {
                trimmed.to_string()
            } else {
                rest.to_string()
            }
        }
        None => trimmed.to_string(),
    }
}

fn parse_decimal(text: &str) -> Option<NumberingPrefix> {
    let caps = DECIMAL.captures(text)?;
    let whole = caps.get(0)?;
    let has_dot = caps.get(2).is_some();
    let has_space = caps.get(3).is_some_and(|m| !m.as_str().is_empty());
    let rest = &text[whole.end()..];

    let mut len = whole.end();
    let terminated = rest.is_empty() || has_space || (has_dot && !rest.starts_with(|c: char| c.is_ascii_digit()));
    if !terminated {
        let sep = rest.chars().next().filter(|c| matches!(c, ':' | '：' | ')' | '、'))?;
        len += sep.len_utf8();
        len += text[len..].len() - text[len..].trim_start().len();
    }

    let numbers = caps[1]
        .split('.')
        .map(|n| n.parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    Some(NumberingPrefix {
        kind: PrefixKind::Decimal,
        numbers,
        len,
    })
}

fn parse_keyword(text: &str) -> Option<NumberingPrefix> {
    let caps = KEYWORD.captures(text)?;
    let kind = match caps[1].to_lowercase().as_str() {
        "part" => PrefixKind::Part,
        "section" => PrefixKind::Section,
        _ => PrefixKind::Chapter,
    };
    let number = parse_label(&caps[2])?;
    Some(NumberingPrefix {
        kind,
        numbers: vec![number],
        len: caps.get(0)?.end(),
    })
}

fn parse_cjk_heading(text: &str) -> Option<NumberingPrefix> {
    let caps = CJK_HEADING.captures(text)?;
    let number = caps[1].parse::<u32>().ok().or_else(|| parse_cjk_numeral(&caps[1]))?;
    let kind = match &caps[2] {
        "节" | "節" => PrefixKind::CjkSection,
        _ => PrefixKind::CjkChapter,
    };
    Some(NumberingPrefix {
        kind,
        numbers: vec![number],
        len: caps.get(0)?.end(),
    })
}

fn parse_cjk_ordinal(text: &str) -> Option<NumberingPrefix> {
    let caps = CJK_ORDINAL.captures(text)?;
    Some(NumberingPrefix {
        kind: PrefixKind::CjkOrdinal,
        numbers: vec![parse_cjk_numeral(&caps[1])?],
        len: caps.get(0)?.end(),
    })
}

fn parse_roman_or_letter(text: &str) -> Option<NumberingPrefix> {
    if let Some(caps) = ROMAN.captures(text) {
        let label = &caps[1];
        // Lone C, D, L and M read as letters ("C. Results"), not numerals.
        if label.len() > 1 || matches!(label, "I" | "V" | "X") {
            if let Some(value) = parse_roman(label) {
                return Some(NumberingPrefix {
                    kind: PrefixKind::Roman,
                    numbers: vec![value],
                    len: caps.get(0)?.end(),
                });
            }
        }
    }

    let caps = LETTER.captures(text)?;
    Some(NumberingPrefix {
        kind: PrefixKind::Letter,
        numbers: vec![letter_ordinal(&caps[1])?],
        len: caps.get(0)?.end(),
    })
}

fn parse_parenthesized(text: &str) -> Option<NumberingPrefix> {
    let caps = PARENTHESIZED.captures(text)?;
    let label = &caps[1];
    let number = label
        .parse::<u32>()
        .ok()
        .or_else(|| parse_cjk_numeral(label))
        .or_else(|| letter_ordinal(label))?;
    Some(NumberingPrefix {
        kind: PrefixKind::Parenthesized,
        numbers: vec![number],
        len: caps.get(0)?.end(),
    })
}

/// Digits, roman numerals or a single letter.
fn parse_label(label: &str) -> Option<u32> {
    if let Ok(n) = label.parse::<u32>() {
        return Some(n);
    }
    let upper = label.to_uppercase();
    if upper.len() == 1 && !matches!(upper.as_str(), "I" | "V" | "X") {
        return letter_ordinal(&upper);
    }
    parse_roman(&upper).or_else(|| letter_ordinal(&upper))
}

fn letter_ordinal(label: &str) -> Option<u32> {
    let mut chars = label.chars();
    let c = chars.next()?.to_ascii_uppercase();
    if chars.next().is_some() || !c.is_ascii_uppercase() {
        return None;
    }
    Some(c as u32 - 'A' as u32 + 1)
}

pub fn parse_roman(label: &str) -> Option<u32> {
    let value_of = |c: char| match c {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    };
    let values = label
        .chars()
        .map(|c| value_of(c.to_ascii_uppercase()))
        .collect::<Option<Vec<u32>>>()?;
    if values.is_empty() {
        return None;
    }

    let mut total: i64 = 0;
    for (i, v) in values.iter().enumerate() {
        if values.get(i + 1).is_some_and(|next| next > v) {
            total -= i64::from(*v);
        } else {
            total += i64::from(*v);
        }
    }
    u32::try_from(total).ok().filter(|t| *t > 0)
}

/// Value of a Chinese numeral up to the hundreds (`十二` → 12, `二十三` → 23).
pub fn parse_cjk_numeral(label: &str) -> Option<u32> {
    let digit = |c: char| match c {
        '零' | '〇' => Some(0),
        '一' => Some(1),
        '二' | '两' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        '七' => Some(7),
        '八' => Some(8),
        '九' => Some(9),
        _ => None,
    };

    let mut total = 0u32;
    let mut pending: Option<u32> = None;
    let mut saw_any = false;
    for c in label.chars() {
        saw_any = true;
        match c {
            '十' => {
                total += pending.take().unwrap_or(1) * 10;
            }
            '百' => {
                total += pending.take().unwrap_or(1) * 100;
            }
            _ => {
                pending = Some(digit(c)?);
            }
        }
    }
    if !saw_any {
        return None;
    }
    Some(total + pending.unwrap_or(0))
}
