//! Level classification for heading candidates, plus the document-wide font
//! statistics used to derive an automatic font threshold.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::filter::HeadingCandidate;
use crate::span::{bucket_key, TextSpan};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierConfig {
    /// Upper bound on distinct heading levels.
    pub max_levels: u8,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { max_levels: 6 }
    }
}

/// Aggregate font-size statistics computed across an entire document.
#[derive(Debug, Clone, PartialEq)]
pub struct FontStatistics {
    /// The most common font size (weighted by character count).
    pub body_size: f32,
    /// `body_size + 1.5`; a reasonable automatic font threshold.
    pub heading_threshold: f32,
    /// `(font_size, total_char_count)` pairs sorted by descending size.
    pub size_histogram: Vec<(f32, usize)>,
}

/// Build font statistics from every extracted span.
///
/// The histogram counts characters, not spans, at each bucketed size.
pub fn build_font_statistics(spans: &[TextSpan]) -> FontStatistics {
    let mut histogram: HashMap<i32, usize> = HashMap::new();
    for span in spans.iter().filter(|s| s.font_size > 0.0) {
        *histogram.entry(bucket_key(span.font_size)).or_insert(0) += span.text.chars().count();
    }

    let mut size_histogram: Vec<(f32, usize)> = histogram
        .into_iter()
        .map(|(k, v)| (k as f32 / 100.0, v))
        .collect();
    size_histogram.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    // `max_by_key` keeps the last maximum, so ties go to the smaller size.
    let body_size = size_histogram
        .iter()
        .max_by_key(|(_, count)| *count)
        .map(|(size, _)| *size)
        .unwrap_or(12.0);

    FontStatistics {
        body_size,
        heading_threshold: body_size + 1.5,
        size_histogram,
    }
}

/// Assign a level to every candidate, in place.
///
/// Precedence per candidate:
/// 1. the structural depth of its numbering prefix;
/// 2. the level of its font-size band, where a band is learned from the
///    depth its numbered members agree on, or else taken from its rank;
/// 3. the level of the nearest preceding candidate at or above its size;
/// 4. level 1.
pub fn classify_levels(candidates: &mut [HeadingCandidate], config: &ClassifierConfig) {
    let max_levels = config.max_levels.max(1);
    let bands = font_bands(candidates, max_levels);
    let band_levels = band_levels(candidates, &bands, max_levels);

    for i in 0..candidates.len() {
        let candidate = &candidates[i];
        let size_key = bucket_key(candidate.span.font_size);
        let band_level = (candidate.span.font_size > 0.0)
            .then(|| band_levels.get(&size_key).copied())
            .flatten();

        let level = if let Some(depth) = candidate.prefix.as_ref().and_then(|p| p.depth()) {
            depth.clamp(1, max_levels)
        } else if let Some(level) = band_level {
            level
        } else {
            candidates[..i]
                .iter()
                .rev()
                .find(|prev| bucket_key(prev.span.font_size) >= size_key)
                .and_then(|prev| prev.level)
                .unwrap_or(1)
        };

        candidates[i].level = Some(level);
    }
}

/// Distinct bucketed sizes by descending size, capped at `max_levels`.
fn font_bands(candidates: &[HeadingCandidate], max_levels: u8) -> Vec<i32> {
    let mut keys: Vec<i32> = candidates
        .iter()
        .filter(|c| c.span.font_size > 0.0)
        .map(|c| bucket_key(c.span.font_size))
        .collect();
    keys.sort_unstable_by(|a, b| b.cmp(a));
    keys.dedup();
    keys.truncate(max_levels as usize);
    keys
}

fn band_levels(candidates: &[HeadingCandidate], bands: &[i32], max_levels: u8) -> BTreeMap<i32, u8> {
    bands
        .iter()
        .enumerate()
        .map(|(rank, &band)| {
            let mut depths: BTreeMap<u8, usize> = BTreeMap::new();
            for c in candidates.iter().filter(|c| bucket_key(c.span.font_size) == band) {
                if let Some(depth) = c.prefix.as_ref().and_then(|p| p.depth()) {
                    *depths.entry(depth).or_insert(0) += 1;
                }
            }
            // BTreeMap iterates ascending, so `rev` + `max_by_key` favours the
            // shallower depth on ties.
            let learned = depths
                .iter()
                .rev()
                .max_by_key(|(_, count)| **count)
                .map(|(depth, _)| *depth);
            let level = learned.unwrap_or(rank as u8 + 1).clamp(1, max_levels);
            (band, level)
        })
        .collect()
}

/// Number of distinct levels assigned across `candidates`.
pub fn distinct_levels(candidates: &[HeadingCandidate]) -> usize {
    let mut levels: Vec<u8> = candidates.iter().filter_map(|c| c.level).collect();
    levels.sort_unstable();
    levels.dedup();
    levels.len()
}
