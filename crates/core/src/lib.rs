//! Core library for pdfmark
//!
//! This crate implements the **Functional Core** of pdfmark: every step of the
//! bookmark pipeline that can be expressed as a pure transformation over text
//! spans, outline entries and bookmark forests.
//!
//! # Architecture Overview
//!
//! - **`pdfmark_core`** (this crate): heading detection, level classification,
//!   hierarchy building, title matching, bookmark file parsing and export
//!   rendering. No I/O.
//! - **`pdfmark_engine`**: PDF reading and writing through `lopdf`, plus the
//!   pipeline orchestration and its events.
//! - **`pdfmark`**: the command line shell.
//!
//! # Module Organization
//!
//! - [`span`]: the `TextSpan` model and shared text normalisation
//! - [`numbering`]: numbering prefix recognition (`1.2`, `Chapter 3`, `第二章`)
//! - [`filter`]: candidate filtering (furniture, columns, thresholds)
//! - [`classify`]: level assignment and font statistics
//! - [`hierarchy`]: the bookmark forest and its builder
//! - [`matching`]: locating supplied titles in document text
//! - [`bookmark_file`]: JSON, CSV and TXT bookmark sources
//! - [`markdown`]: Markdown heading outlines
//! - [`export`]: rendering a forest as JSON, CSV or TXT
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use pdfmark_core::hierarchy::{build_forest, OutlineEntry};
//!
//! let forest = build_forest(vec![
//!     OutlineEntry::new("Intro", 1, Some(1)),
//!     OutlineEntry::new("Background", 2, Some(1)),
//! ]);
//! assert_eq!(forest[0].children.len(), 1);
//! ```

pub mod bookmark_file;
pub mod classify;
pub mod export;
pub mod filter;
pub mod hierarchy;
pub mod markdown;
pub mod matching;
pub mod numbering;
pub mod span;

pub use hierarchy::{BookmarkNode, OutlineEntry};
pub use span::{Rect, TextSpan};

/// Errors raised while reading user-supplied outlines.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV line {line}: {message}")]
    Csv { line: usize, message: String },

    #[error("line {line}: invalid {field} value {value:?}")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("unsupported bookmark file format: {0:?} (expected json, csv or txt)")]
    UnsupportedFormat(String),

    #[error("{0} contains no entries")]
    Empty(&'static str),
}
