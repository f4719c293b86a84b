//! Invocation options and their validation into an immutable [`EngineConfig`].
//!
//! An [`Invocation`] is what a caller sends (camelCase JSON, or built from
//! command line flags). [`EngineConfig::from_invocation`] checks it before any
//! PDF is opened and resolves defaults, so the pipeline only ever sees a
//! consistent configuration.

use std::path::{Path, PathBuf};

use pdfmark_core::classify::ClassifierConfig;
use pdfmark_core::export::{ExportFormat, ExportOptions};
use pdfmark_core::filter::{FilterConfig, FurnitureConfig};
use pdfmark_core::matching::MatchConfig;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationMode {
    #[default]
    Auto,
    BookmarkFileAssisted,
    MarkdownAssisted,
    ExtractOnly,
}

/// `fontThreshold` accepts a number of points or the keyword `"auto"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FontThreshold {
    Points(f32),
    Keyword(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Invocation {
    pub input_path: Option<PathBuf>,
    pub mode: InvocationMode,
    pub output_path: Option<PathBuf>,
    pub debug: bool,

    // auto
    pub disable_font_filter: bool,
    pub font_threshold: Option<FontThreshold>,
    pub exclude_titles: Vec<String>,
    pub include_titles: Vec<String>,
    pub require_numeric_start: bool,
    pub disable_x_filter: bool,
    pub x_tolerance: Option<f32>,
    pub keep_numbering: bool,
    pub max_levels: Option<u8>,
    pub keep_non_titles: bool,
    /// Allow the document title (the one largest span on page 1) as a heading.
    pub keep_document_title: bool,
    pub furniture_min_pages: Option<usize>,
    pub furniture_tolerance: Option<f32>,

    // assisted
    pub bookmark_file_path: Option<PathBuf>,
    pub markdown_file_path: Option<PathBuf>,
    pub fuzzy_match: bool,

    // extract-only
    pub format: ExportFormat,
    pub include_page_info: bool,
    pub include_level_info: bool,
}

impl Default for Invocation {
    fn default() -> Self {
        Self {
            input_path: None,
            mode: InvocationMode::default(),
            output_path: None,
            debug: false,
            disable_font_filter: false,
            font_threshold: None,
            exclude_titles: Vec::new(),
            include_titles: Vec::new(),
            require_numeric_start: false,
            disable_x_filter: false,
            x_tolerance: None,
            keep_numbering: false,
            max_levels: None,
            keep_non_titles: false,
            keep_document_title: false,
            furniture_min_pages: None,
            furniture_tolerance: None,
            bookmark_file_path: None,
            markdown_file_path: None,
            fuzzy_match: true,
            format: ExportFormat::default(),
            include_page_info: true,
            include_level_info: true,
        }
    }
}

impl Invocation {
    pub fn new(input_path: impl Into<PathBuf>, mode: InvocationMode) -> Self {
        Self {
            input_path: Some(input_path.into()),
            mode,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Validated configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdSetting {
    Fixed(f32),
    /// Body size plus a margin, computed from the document.
    Auto,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoOptions {
    /// Threshold fields are left disabled here; the pipeline applies
    /// `threshold` once the value is known.
    pub filter: FilterConfig,
    pub threshold: Option<ThresholdSetting>,
    pub classifier: ClassifierConfig,
    pub strip_numbering: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Auto(AutoOptions),
    BookmarkFile { path: PathBuf, matching: MatchConfig },
    Markdown { path: PathBuf, matching: MatchConfig },
    ExtractOnly(ExportOptions),
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Auto(_) => "auto",
            Mode::BookmarkFile { .. } => "bookmark-file-assisted",
            Mode::Markdown { .. } => "markdown-assisted",
            Mode::ExtractOnly(_) => "extract-only",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: Mode,
    pub debug: bool,
}

impl EngineConfig {
    /// Validate an invocation. Only the file system metadata of the input and
    /// output paths is consulted; nothing is opened.
    pub fn from_invocation(inv: &Invocation) -> Result<Self, EngineError> {
        let input = inv
            .input_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| EngineError::config("an input PDF path is required"))?;

        if inv.bookmark_file_path.is_some() && inv.markdown_file_path.is_some() {
            return Err(EngineError::config(
                "give either a bookmark file or a Markdown file, not both",
            ));
        }

        let mode = match inv.mode {
            InvocationMode::Auto => Mode::Auto(auto_options(inv)?),
            InvocationMode::BookmarkFileAssisted => Mode::BookmarkFile {
                path: inv.bookmark_file_path.clone().ok_or_else(|| {
                    EngineError::config("bookmark-file-assisted mode needs bookmarkFilePath")
                })?,
                matching: matching(inv),
            },
            InvocationMode::MarkdownAssisted => Mode::Markdown {
                path: inv.markdown_file_path.clone().ok_or_else(|| {
                    EngineError::config("markdown-assisted mode needs markdownFilePath")
                })?,
                matching: matching(inv),
            },
            InvocationMode::ExtractOnly => Mode::ExtractOnly(ExportOptions {
                format: inv.format,
                include_page_info: inv.include_page_info,
                include_level_info: inv.include_level_info,
            }),
        };

        let output = match &inv.output_path {
            Some(path) => path.clone(),
            None => default_output_path(&input, &mode),
        };
        if same_file(&input, &output) {
            return Err(EngineError::config(format!(
                "output path {} is the input file; choose a different output",
                output.display()
            )));
        }

        Ok(Self {
            input,
            output,
            mode,
            debug: inv.debug,
        })
    }
}

fn auto_options(inv: &Invocation) -> Result<AutoOptions, EngineError> {
    let defaults = FilterConfig::default();

    let x_tolerance = inv.x_tolerance.unwrap_or(defaults.x_tolerance);
    if x_tolerance.is_nan() || x_tolerance < 0.0 {
        return Err(EngineError::config(format!(
            "xTolerance must be zero or positive, got {x_tolerance}"
        )));
    }

    let max_levels = inv.max_levels.unwrap_or(ClassifierConfig::default().max_levels);
    if max_levels == 0 {
        return Err(EngineError::config("maxLevels must be at least 1"));
    }

    let furniture = FurnitureConfig {
        min_pages: inv.furniture_min_pages.unwrap_or(defaults.furniture.min_pages),
        position_tolerance: inv
            .furniture_tolerance
            .unwrap_or(defaults.furniture.position_tolerance),
    };
    if furniture.min_pages < 2 {
        return Err(EngineError::config("furnitureMinPages must be at least 2"));
    }
    if furniture.position_tolerance.is_nan() || furniture.position_tolerance < 0.0 {
        return Err(EngineError::config("furnitureTolerance must be zero or positive"));
    }

    let threshold = match &inv.font_threshold {
        _ if inv.disable_font_filter => None,
        None => None,
        Some(FontThreshold::Points(points)) if *points > 0.0 && points.is_finite() => {
            Some(ThresholdSetting::Fixed(*points))
        }
        Some(FontThreshold::Points(points)) => {
            return Err(EngineError::config(format!(
                "fontThreshold must be a positive size, got {points}"
            )))
        }
        Some(FontThreshold::Keyword(word)) if word.eq_ignore_ascii_case("auto") => Some(ThresholdSetting::Auto),
        Some(FontThreshold::Keyword(word)) => {
            return Err(EngineError::config(format!(
                "fontThreshold must be a number or \"auto\", got {word:?}"
            )))
        }
    };

    let filter = FilterConfig {
        x_filter_enabled: !inv.disable_x_filter,
        x_tolerance,
        require_numeric_start: inv.require_numeric_start,
        skip_non_titles: !inv.keep_non_titles,
        exclude_document_title: !inv.keep_document_title,
        furniture,
        ..defaults
    }
    .with_exclude_titles(&inv.exclude_titles)
    .with_include_titles(&inv.include_titles);

    Ok(AutoOptions {
        filter,
        threshold,
        classifier: ClassifierConfig { max_levels },
        strip_numbering: !inv.keep_numbering,
    })
}

fn matching(inv: &Invocation) -> MatchConfig {
    MatchConfig {
        fuzzy: inv.fuzzy_match,
        ..MatchConfig::default()
    }
}

/// `report.pdf` becomes `report_with_bookmarks.pdf`, or
/// `report_bookmarks.<ext>` when extracting.
pub fn default_output_path(input: &Path, mode: &Mode) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let name = match mode {
        Mode::ExtractOnly(options) => format!("{stem}_bookmarks.{}", options.format.extension()),
        _ => format!("{stem}_with_bookmarks.pdf"),
    };
    input.with_file_name(name)
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
