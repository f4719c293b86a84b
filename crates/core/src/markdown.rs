//! Markdown heading outlines (ATX `#` headings and setext underlines).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::matching::SourceEntry;

static ATX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*?))?(?:[ \t]+#+)?[ \t]*$").unwrap());

static SETEXT_H1: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ {0,3}=+[ \t]*$").unwrap());

static SETEXT_H2: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ {0,3}-+[ \t]*$").unwrap());

static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})").unwrap());

static BLOCK_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(?:[-*+][ \t]|\d{1,9}[.)][ \t]|>|\|)").unwrap());

static INLINE_IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static INLINE_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]*)`").unwrap());
static STRONG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*|__(.+?)__").unwrap());
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.+?)\*").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").unwrap());
static HEADING_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\{#[^}]*\}\s*$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownHeading {
    pub title: String,
    pub level: u8,
    /// Display numbering such as `1.2`, relative to the shallowest heading.
    pub prefix: String,
}

/// Extract the heading outline of a Markdown document in order.
///
/// Headings inside fenced or indented code blocks and YAML front matter are
/// ignored, and inline markup is stripped from titles.
pub fn parse_markdown_headings(markdown: &str) -> Vec<MarkdownHeading> {
    let raw = collect_headings(markdown);
    let min_level = raw.iter().map(|(_, level)| *level).min().unwrap_or(1);

    let mut counters = [0u32; 6];
    raw.into_iter()
        .map(|(title, level)| {
            let idx = usize::from(level - min_level);
            counters[idx] += 1;
            for deeper in counters.iter_mut().skip(idx + 1) {
                *deeper = 0;
            }
            let prefix = counters[..=idx]
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(".");
            MarkdownHeading { title, level, prefix }
        })
        .collect()
}

/// Headings as resolvable entries, keeping their Markdown depth as level.
pub fn headings_to_entries(headings: &[MarkdownHeading]) -> Vec<SourceEntry> {
    headings
        .iter()
        .map(|h| SourceEntry {
            title: h.title.clone(),
            level: Some(h.level),
            page: None,
        })
        .collect()
}

fn collect_headings(markdown: &str) -> Vec<(String, u8)> {
    let markdown = markdown.strip_prefix('\u{feff}').unwrap_or(markdown);
    let mut lines = markdown.lines().peekable();
    let mut headings = Vec::new();

    // YAML front matter
    if lines.peek().is_some_and(|l| l.trim_end() == "---") {
        lines.next();
        for line in lines.by_ref() {
            if matches!(line.trim_end(), "---" | "...") {
                break;
            }
        }
    }

    let mut fence: Option<String> = None;
    let mut paragraph: Vec<&str> = Vec::new();

    for line in lines {
        if let Some(open) = &fence {
            let trimmed = line.trim_start();
            if trimmed.starts_with(open.as_str()) && trimmed.trim_end().chars().all(|c| c == open.as_bytes()[0] as char) {
                fence = None;
            }
            continue;
        }
        if let Some(caps) = FENCE.captures(line) {
            fence = Some(caps[1].to_string());
            paragraph.clear();
            continue;
        }

        if line.trim().is_empty() {
            paragraph.clear();
            continue;
        }

        if !paragraph.is_empty() {
            let setext = if SETEXT_H1.is_match(line) {
                Some(1)
            } else if SETEXT_H2.is_match(line) {
                Some(2)
            } else {
                None
            };
            if let Some(level) = setext {
                let title = clean_inline(&paragraph.join(" "));
                if !title.is_empty() {
                    headings.push((title, level));
                }
                paragraph.clear();
                continue;
            }
        }

        if let Some(caps) = ATX.captures(line) {
            let level = caps[1].len() as u8;
            let title = clean_inline(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
            if !title.is_empty() {
                headings.push((title, level));
            }
            paragraph.clear();
            continue;
        }

        let indented_code = paragraph.is_empty() && (line.starts_with("    ") || line.starts_with('\t'));
        if indented_code || BLOCK_START.is_match(line) {
            paragraph.clear();
            continue;
        }

        paragraph.push(line.trim());
    }

    headings
}

/// Strip inline Markdown and HTML from heading text.
fn clean_inline(text: &str) -> String {
    let text = HEADING_ID.replace(text, "");
    let text = INLINE_IMAGE.replace_all(&text, "$1");
    let text = INLINE_LINK.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = STRONG.replace_all(&text, "$1$2");
    let text = EMPHASIS.replace_all(&text, "$1");
    let text = HTML_TAG.replace_all(&text, "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline(md: &str) -> Vec<(String, u8, String)> {
        parse_markdown_headings(md)
            .into_iter()
            .map(|h| (h.title, h.level, h.prefix))
            .collect()
    }

    fn h(title: &str, level: u8, prefix: &str) -> (String, u8, String) {
        (title.to_string(), level, prefix.to_string())
    }

    #[test]
    fn test_atx_headings_with_prefixes() {
        let md = "# Intro\ntext\n## Background\n## Scope\n### Detail\n# Methods\n";
        assert_eq!(
            outline(md),
            vec![
                h("Intro", 1, "1"),
                h("Background", 2, "1.1"),
                h("Scope", 2, "1.2"),
                h("Detail", 3, "1.2.1"),
                h("Methods", 1, "2"),
            ]
        );
    }

    #[test]
    fn test_prefix_is_relative_to_shallowest_level() {
        let md = "## First\n### Sub\n## Second\n";
        assert_eq!(
            outline(md),
            vec![h("First", 2, "1"), h("Sub", 3, "1.1"), h("Second", 2, "2")]
        );
    }

    #[test]
    fn test_setext_headings() {
        let md = "Title\n=====\n\nSome paragraph\n\nPart A\n------\n\n---\n";
        assert_eq!(outline(md), vec![h("Title", 1, "1"), h("Part A", 2, "1.1")]);
    }

    #[test]
    fn test_closing_hashes_and_requires_space() {
        let md = "# Closed #\n#hashtag\n####### too deep\n##\n";
        assert_eq!(outline(md), vec![h("Closed", 1, "1")]);
    }

    #[test]
    fn test_code_blocks_are_skipped() {
        let md = "# Real\n```\n# not a heading\n```\n~~~python\n## nor this\n~~~\n\n    # indented code\n## Also Real\n";
        assert_eq!(outline(md), vec![h("Real", 1, "1"), h("Also Real", 2, "1.1")]);
    }

    #[test]
    fn test_front_matter_is_skipped() {
        let md = "---\ntitle: Doc\n---\n# Start\n";
        assert_eq!(outline(md), vec![h("Start", 1, "1")]);
    }

    #[test]
    fn test_inline_markup_is_stripped() {
        let md = "# **Bold** and *em* with `code`\n## [Link text](http://x.y) <span>tag</span> {#anchor}\n";
        assert_eq!(
            outline(md),
            vec![
                h("Bold and em with code", 1, "1"),
                h("Link text tag", 2, "1.1"),
            ]
        );
    }

    #[test]
    fn test_list_items_do_not_become_setext() {
        let md = "- item\n---\n";
        assert!(outline(md).is_empty());
    }

    #[test]
    fn test_entries_keep_depth() {
        let headings = parse_markdown_headings("## A\n### B\n");
        let entries = headings_to_entries(&headings);
        assert_eq!(entries[0].level, Some(2));
        assert_eq!(entries[1].level, Some(3));
        assert!(entries.iter().all(|e| e.page.is_none()));
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_markdown_headings("").is_empty());
        assert!(parse_markdown_headings("just text\n").is_empty());
    }
}
