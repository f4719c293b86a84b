//! Bookmark forests and the stack-based builder that nests ordered entries.

use serde::{Deserialize, Serialize};

use crate::filter::HeadingCandidate;
use crate::numbering::strip_prefix;

/// One bookmark in the outline.
///
/// Every child sits exactly one level below its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkNode {
    pub title: String,
    /// 1-based target page. `None` when the entry could not be placed.
    pub page: Option<u32>,
    pub level: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BookmarkNode>,
}

impl BookmarkNode {
    pub fn new(title: impl Into<String>, page: Option<u32>, level: u8) -> Self {
        Self {
            title: title.into(),
            page,
            level,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<BookmarkNode>) -> Self {
        self.children = children;
        self
    }
}

/// A flat, ordered outline entry before nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub title: String,
    pub level: u8,
    pub page: Option<u32>,
}

impl OutlineEntry {
    pub fn new(title: impl Into<String>, level: u8, page: Option<u32>) -> Self {
        Self {
            title: title.into(),
            level,
            page,
        }
    }
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Turn classified candidates into outline entries.
///
/// Candidates without a level are treated as level 1. Titles lose their
/// numbering prefix when `strip_numbering` is set.
pub fn entries_from_candidates(candidates: &[HeadingCandidate], strip_numbering: bool) -> Vec<OutlineEntry> {
    candidates
        .iter()
        .map(|c| OutlineEntry {
            title: if strip_numbering {
                strip_prefix(&c.text)
            } else {
                c.text.clone()
            },
            level: c.level.unwrap_or(1),
            page: Some(c.span.page as u32 + 1),
        })
        .collect()
}

/// Shift levels so the shallowest entry sits at level 1.
pub fn normalize_levels(entries: &mut [OutlineEntry]) {
    let Some(min) = entries.iter().map(|e| e.level.max(1)).min() else {
        return;
    };
    for entry in entries.iter_mut() {
        entry.level = entry.level.max(1) - (min - 1);
    }
}

/// Nest ordered entries into a forest in one left-to-right pass.
///
/// Open nodes live on a stack, one per active level. For each entry, open
/// nodes at or below its level are closed first. A level more than one deeper
/// than the deepest open node is clamped to deepest + 1, and the entry is then
/// opened under the deepest remaining node (or as a new root).
pub fn build_forest<I>(entries: I) -> Vec<BookmarkNode>
where
    I: IntoIterator<Item = OutlineEntry>,
{
    let mut roots: Vec<BookmarkNode> = Vec::new();
    let mut stack: Vec<BookmarkNode> = Vec::new();

    for entry in entries {
        let requested = entry.level.max(1);
        while stack.last().is_some_and(|open| open.level >= requested) {
            close_top(&mut stack, &mut roots);
        }

        let deepest = stack.last().map(|open| open.level).unwrap_or(0);
        let level = requested.min(deepest + 1);
        stack.push(BookmarkNode::new(entry.title, entry.page, level));
    }

    while !stack.is_empty() {
        close_top(&mut stack, &mut roots);
    }

    roots
}

/// Pop the top of the stack and attach it to its parent (or the roots).
fn close_top(stack: &mut Vec<BookmarkNode>, roots: &mut Vec<BookmarkNode>) {
    if let Some(node) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }
}

// ---------------------------------------------------------------------------
// Traversal helpers
// ---------------------------------------------------------------------------

/// Pre-order (document order) view of every node in the forest.
pub fn flatten(forest: &[BookmarkNode]) -> Vec<&BookmarkNode> {
    fn walk<'a>(nodes: &'a [BookmarkNode], out: &mut Vec<&'a BookmarkNode>) {
        for node in nodes {
            out.push(node);
            walk(&node.children, out);
        }
    }
    let mut out = Vec::new();
    walk(forest, &mut out);
    out
}

pub fn count_nodes(forest: &[BookmarkNode]) -> usize {
    forest.iter().map(|n| 1 + count_nodes(&n.children)).sum()
}

pub fn max_depth(forest: &[BookmarkNode]) -> u8 {
    forest
        .iter()
        .map(|n| n.level.max(max_depth(&n.children)))
        .max()
        .unwrap_or(0)
}

/// Count of nodes whose page could not be resolved.
pub fn count_unresolved(forest: &[BookmarkNode]) -> usize {
    flatten(forest).iter().filter(|n| n.page.is_none()).count()
}

/// `true` when roots are level 1 and every child is exactly one level below
/// its parent.
pub fn is_well_formed(forest: &[BookmarkNode]) -> bool {
    fn check(nodes: &[BookmarkNode], expected: u8) -> bool {
        nodes
            .iter()
            .all(|n| n.level == expected && check(&n.children, expected + 1))
    }
    check(forest, 1)
}
