use std::path::PathBuf;

use pdfmark_core::export::ExportFormat;
use pdfmark_engine::config::{FontThreshold, InvocationMode};
use pdfmark_engine::Invocation;

use crate::prelude::*;

#[derive(Debug, Clone, clap::Args)]
pub struct AutoArgs {
    /// Path to the PDF file
    #[clap(env = "PDFMARK_INPUT")]
    input: PathBuf,

    /// Where to write the bookmarked PDF (default: <input>_with_bookmarks.pdf)
    #[arg(short, long, env = "PDFMARK_OUTPUT")]
    output: Option<PathBuf>,

    /// Minimum heading font size in points, or "auto" to derive it from the body text
    #[arg(long, env = "PDFMARK_FONT_THRESHOLD")]
    font_threshold: Option<String>,

    /// Ignore --font-threshold
    #[arg(long)]
    disable_font_filter: bool,

    /// Never bookmark this title (repeatable, or a JSON array)
    #[arg(long = "exclude", value_name = "TITLE")]
    exclude_titles: Vec<String>,

    /// Always bookmark this title (repeatable, or a JSON array)
    #[arg(long = "include", value_name = "TITLE")]
    include_titles: Vec<String>,

    /// Only keep headings that start with numbering ("1.2", "Chapter 3", "A.")
    #[arg(long)]
    require_numeric_start: bool,

    /// Keep headings regardless of their horizontal position
    #[arg(long)]
    disable_x_filter: bool,

    /// Allowed distance in points from the heading column (default: 5)
    #[arg(long)]
    x_tolerance: Option<f32>,

    /// Keep numbering prefixes in bookmark titles
    #[arg(long)]
    keep_numbering: bool,

    /// Maximum number of heading levels (default: 6)
    #[arg(long)]
    max_levels: Option<u8>,

    /// Keep text that does not look like a title (page numbers, URLs, dot leaders)
    #[arg(long)]
    keep_non_titles: bool,

    /// Allow the document title on the first page to become a bookmark
    #[arg(long)]
    keep_document_title: bool,

    /// Pages a header or footer must repeat on to be ignored (default: 3)
    #[arg(long)]
    furniture_min_pages: Option<usize>,

    /// Position tolerance in points for repeated headers and footers (default: 2)
    #[arg(long)]
    furniture_tolerance: Option<f32>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct FileArgs {
    /// Path to the PDF file
    #[clap(env = "PDFMARK_INPUT")]
    input: PathBuf,

    /// Bookmark list (.json, .csv or .txt)
    bookmarks: PathBuf,

    /// Where to write the bookmarked PDF (default: <input>_with_bookmarks.pdf)
    #[arg(short, long, env = "PDFMARK_OUTPUT")]
    output: Option<PathBuf>,

    /// Only accept titles found verbatim; no near matches
    #[arg(long)]
    exact: bool,
}

#[derive(Debug, Clone, clap::Args)]
pub struct MarkdownArgs {
    /// Path to the PDF file
    #[clap(env = "PDFMARK_INPUT")]
    input: PathBuf,

    /// Markdown document whose headings become bookmarks
    markdown: PathBuf,

    /// Where to write the bookmarked PDF (default: <input>_with_bookmarks.pdf)
    #[arg(short, long, env = "PDFMARK_OUTPUT")]
    output: Option<PathBuf>,

    /// Only accept headings found verbatim; no near matches
    #[arg(long)]
    exact: bool,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ExtractArgs {
    /// Path to the PDF file
    #[clap(env = "PDFMARK_INPUT")]
    input: PathBuf,

    /// Where to write the export (default: <input>_bookmarks.<format>)
    #[arg(short, long, env = "PDFMARK_OUTPUT")]
    output: Option<PathBuf>,

    /// Export format: json, csv or txt
    #[arg(short, long, default_value = "json")]
    format: ExportFormat,

    /// Leave out target pages
    #[arg(long)]
    no_page_info: bool,

    /// Leave out levels (CSV indents titles instead)
    #[arg(long)]
    no_level_info: bool,
}

impl AutoArgs {
    fn into_invocation(self, global: &crate::Global) -> Result<Invocation> {
        Ok(Invocation {
            output_path: self.output,
            debug: global.debug,
            disable_font_filter: self.disable_font_filter,
            font_threshold: self.font_threshold.as_deref().map(parse_threshold),
            exclude_titles: expand_titles(self.exclude_titles)?,
            include_titles: expand_titles(self.include_titles)?,
            require_numeric_start: self.require_numeric_start,
            disable_x_filter: self.disable_x_filter,
            x_tolerance: self.x_tolerance,
            keep_numbering: self.keep_numbering,
            max_levels: self.max_levels,
            keep_non_titles: self.keep_non_titles,
            keep_document_title: self.keep_document_title,
            furniture_min_pages: self.furniture_min_pages,
            furniture_tolerance: self.furniture_tolerance,
            ..Invocation::new(self.input, InvocationMode::Auto)
        })
    }
}

impl From<FileArgs> for Invocation {
    fn from(args: FileArgs) -> Self {
        Invocation {
            output_path: args.output,
            bookmark_file_path: Some(args.bookmarks),
            fuzzy_match: !args.exact,
            ..Invocation::new(args.input, InvocationMode::BookmarkFileAssisted)
        }
    }
}

impl From<MarkdownArgs> for Invocation {
    fn from(args: MarkdownArgs) -> Self {
        Invocation {
            output_path: args.output,
            markdown_file_path: Some(args.markdown),
            fuzzy_match: !args.exact,
            ..Invocation::new(args.input, InvocationMode::MarkdownAssisted)
        }
    }
}

impl From<ExtractArgs> for Invocation {
    fn from(args: ExtractArgs) -> Self {
        Invocation {
            output_path: args.output,
            format: args.format,
            include_page_info: !args.no_page_info,
            include_level_info: !args.no_level_info,
            ..Invocation::new(args.input, InvocationMode::ExtractOnly)
        }
    }
}

/// A number is a size in points; anything else is passed on as a keyword and
/// validated by the engine.
fn parse_threshold(value: &str) -> FontThreshold {
    match value.trim().parse::<f32>() {
        Ok(points) => FontThreshold::Points(points),
        Err(_) => FontThreshold::Keyword(value.trim().to_string()),
    }
}

/// Flatten title arguments, expanding any that are JSON arrays.
fn expand_titles(values: Vec<String>) -> Result<Vec<String>> {
    let mut titles = Vec::with_capacity(values.len());
    for value in values {
        if value.trim_start().starts_with('[') {
            let list: Vec<String> =
                serde_json::from_str(&value).map_err(|_| Error::InvalidTitleList(value.clone()))?;
            titles.extend(list);
        } else {
            titles.push(value);
        }
    }
    Ok(titles)
}

pub async fn auto(args: AutoArgs, global: crate::Global) -> Result<()> {
    let invocation = args.into_invocation(&global)?;
    crate::runner::execute(invocation, &global).await
}

pub async fn file(args: FileArgs, global: crate::Global) -> Result<()> {
    let invocation = Invocation {
        debug: global.debug,
        ..args.into()
    };
    crate::runner::execute(invocation, &global).await
}

pub async fn markdown(args: MarkdownArgs, global: crate::Global) -> Result<()> {
    let invocation = Invocation {
        debug: global.debug,
        ..args.into()
    };
    crate::runner::execute(invocation, &global).await
}

pub async fn extract(args: ExtractArgs, global: crate::Global) -> Result<()> {
    let invocation = Invocation {
        debug: global.debug,
        ..args.into()
    };
    crate::runner::execute(invocation, &global).await
}
