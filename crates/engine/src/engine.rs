//! The pipeline driver.
//!
//! ```text
//! auto:      Extracting -> Filtering -> Classifying -> BuildingTree -> Writing -> Done
//! assisted:  Extracting -> BuildingTree -> Writing -> Done
//! extract:   Extracting -> Writing -> Done
//! ```
//!
//! Each stage is a call into `pdfmark_core`; this module owns the I/O around
//! them: opening the document, reading source files, and writing the output
//! through a temp file in the target directory that is renamed into place.
//! Any stage may end the run in `Failed`, including a run that found nothing
//! to write.
//!
//! Debug runs also forward every filter, classifier and matcher decision as
//! an [`EngineEvent::Diagnostic`].

use std::io::Write;
use std::path::Path;

use log::{debug, info, warn};
use lopdf::Document;
use pdfmark_core::bookmark_file::{parse_bookmark_source, SourceFormat};
use pdfmark_core::classify::{build_font_statistics, classify_levels, distinct_levels};
use pdfmark_core::export::{export_forest, ExportOptions};
use pdfmark_core::filter::filter_candidates;
use pdfmark_core::hierarchy::{
    build_forest, count_nodes, count_unresolved, entries_from_candidates, max_depth, normalize_levels,
};
use pdfmark_core::markdown::{headings_to_entries, parse_markdown_headings};
use pdfmark_core::matching::{resolve_entries, MatchConfig, SourceEntry, TextIndex};
use pdfmark_core::{BookmarkNode, ParseError, TextSpan};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::{AutoOptions, EngineConfig, Mode, ThresholdSetting};
use crate::error::EngineError;
use crate::events::{EngineEvent, EventSink, Stage};
use crate::outline::{read_outline, write_outline};
use crate::parser::backend::LopdfBackend;
use crate::parser::layout::iter_pages;
use crate::PdfError;

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub output_path: String,
    /// Bookmarks written, or extracted in extract-only mode.
    pub node_count: usize,
    /// Titles that could not be located in the document text.
    pub unmatched_count: usize,
    /// Depth of the deepest bookmark.
    pub levels: u8,
}

/// Run one invocation end to end.
///
/// Exactly one of `Finished` or `Failed` is emitted last.
pub fn run(config: &EngineConfig, sink: &mut dyn EventSink) -> Result<RunSummary, EngineError> {
    info!(
        "{} run on {} -> {}",
        config.mode.name(),
        config.input.display(),
        config.output.display()
    );

    let result = match &config.mode {
        Mode::Auto(options) => run_auto(config, options, sink),
        // Source files are read before the PDF is opened.
        Mode::BookmarkFile { path, matching } => {
            load_bookmark_file(path).and_then(|entries| run_assisted(config, entries, matching, sink))
        }
        Mode::Markdown { path, matching } => {
            load_markdown(path).and_then(|entries| run_assisted(config, entries, matching, sink))
        }
        Mode::ExtractOnly(options) => run_extract(config, options, sink),
    };

    match &result {
        Ok(summary) => {
            info!(
                "wrote {} ({} bookmarks, {} unmatched)",
                summary.output_path, summary.node_count, summary.unmatched_count
            );
            sink.emit(EngineEvent::StageChanged { stage: Stage::Done });
            sink.emit(EngineEvent::Finished {
                summary: summary.clone(),
            });
        }
        Err(err) => {
            debug!("run failed: {err}");
            sink.emit(EngineEvent::StageChanged { stage: Stage::Failed });
            sink.emit(EngineEvent::Failed {
                failure: err.to_failure(),
            });
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

fn run_auto(config: &EngineConfig, options: &AutoOptions, sink: &mut dyn EventSink) -> Result<RunSummary, EngineError> {
    enter(Stage::Extracting, sink)?;
    let backend = open_document(&config.input)?;
    let spans = scan(&backend, &config.input, sink)?;

    enter(Stage::Filtering, sink)?;
    let stats = build_font_statistics(&spans);
    let sizes: Vec<String> = stats
        .size_histogram
        .iter()
        .map(|(size, chars)| format!("{size:.1}pt x{chars}"))
        .collect();
    diagnose(
        config,
        sink,
        format!("font sizes: {}; body text {:.1}pt", sizes.join(", "), stats.body_size),
    );
    let filter = match options.threshold {
        None => options.filter.clone(),
        Some(ThresholdSetting::Fixed(points)) => options.filter.clone().with_font_threshold(points),
        Some(ThresholdSetting::Auto) => {
            info!(
                "body text is {:.1}pt; using font threshold {:.1}pt",
                stats.body_size, stats.heading_threshold
            );
            options.filter.clone().with_font_threshold(stats.heading_threshold)
        }
    };
    let outcome = filter_candidates(&spans, &filter);
    if let Some(title) = &outcome.document_title {
        diagnose(config, sink, format!("document title {title:?} is not a heading"));
    }
    for (index, reason) in &outcome.rejections {
        let span = &spans[*index];
        diagnose(
            config,
            sink,
            format!("page {}: rejected {:?}: {reason}", span.page + 1, span.text),
        );
    }
    info!(
        "{} heading candidates, {} spans rejected",
        outcome.candidates.len(),
        outcome.rejections.len()
    );
    sink.emit(EngineEvent::CandidatesFound {
        kept: outcome.candidates.len(),
        rejected: outcome.rejections.len(),
    });

    enter(Stage::Classifying, sink)?;
    let mut candidates = outcome.candidates;
    classify_levels(&mut candidates, &options.classifier);
    for c in &candidates {
        diagnose(
            config,
            sink,
            format!(
                "page {}: level {} {:?} ({:.1}pt)",
                c.span.page + 1,
                c.level.unwrap_or(1),
                c.text,
                c.span.font_size
            ),
        );
    }
    sink.emit(EngineEvent::LevelsAssigned {
        levels: distinct_levels(&candidates),
    });

    enter(Stage::BuildingTree, sink)?;
    let mut entries = entries_from_candidates(&candidates, options.strip_numbering);
    normalize_levels(&mut entries);
    let forest = build_forest(entries);
    if forest.is_empty() {
        return Err(EngineError::NoResult(format!(
            "No headings detected in {}",
            config.input.display()
        )));
    }

    enter(Stage::Writing, sink)?;
    let mut doc = backend.into_document();
    apply_outline(&mut doc, &forest, &config.output)?;
    save_document(&mut doc, &config.output)?;
    Ok(summary(&config.output, &forest))
}

fn run_assisted(
    config: &EngineConfig,
    entries: Vec<SourceEntry>,
    matching: &MatchConfig,
    sink: &mut dyn EventSink,
) -> Result<RunSummary, EngineError> {
    enter(Stage::Extracting, sink)?;
    let backend = open_document(&config.input)?;
    // Declared pages need no text search.
    let index = if entries.iter().any(|e| e.page.is_none()) {
        TextIndex::from_spans(&scan(&backend, &config.input, sink)?)
    } else {
        TextIndex::default()
    };

    let matches = resolve_entries(&entries, &index, matching);
    for m in &matches {
        match m.page {
            None => {
                warn!("no match for {:?}; keeping it without a page", m.title);
                sink.emit(EngineEvent::TitleUnmatched { title: m.title.clone() });
            }
            Some(page) if m.confidence < 1.0 => {
                let message = format!(
                    "{:?} matched approximately on page {page} (similarity {:.2})",
                    m.title, m.confidence
                );
                warn!("{message}");
                sink.emit(EngineEvent::Warning { message });
            }
            Some(page) => diagnose(config, sink, format!("{:?} -> page {page}", m.title)),
        }
    }

    enter(Stage::BuildingTree, sink)?;
    let mut outline: Vec<_> = matches.iter().map(|m| m.to_outline_entry()).collect();
    normalize_levels(&mut outline);
    let forest = build_forest(outline);
    if count_unresolved(&forest) == count_nodes(&forest) {
        return Err(EngineError::NoResult(format!(
            "None of the {} titles were found in {}",
            count_nodes(&forest),
            config.input.display()
        )));
    }

    enter(Stage::Writing, sink)?;
    let mut doc = backend.into_document();
    apply_outline(&mut doc, &forest, &config.output)?;
    save_document(&mut doc, &config.output)?;
    Ok(summary(&config.output, &forest))
}

fn run_extract(
    config: &EngineConfig,
    options: &ExportOptions,
    sink: &mut dyn EventSink,
) -> Result<RunSummary, EngineError> {
    enter(Stage::Extracting, sink)?;
    let backend = open_document(&config.input)?;
    let forest = read_outline(backend.raw_doc()).map_err(|source| EngineError::DocumentRead {
        path: config.input.clone(),
        source,
    })?;
    if forest.is_empty() {
        return Err(EngineError::NoResult(format!(
            "{} has no bookmarks",
            config.input.display()
        )));
    }

    enter(Stage::Writing, sink)?;
    let rendered = export_forest(&forest, options).map_err(|e| EngineError::write(&config.output, e))?;
    write_atomically(&config.output, rendered.as_bytes())?;
    Ok(summary(&config.output, &forest))
}

/// Announce `stage`, unless the caller has asked to stop.
fn enter(stage: Stage, sink: &mut dyn EventSink) -> Result<(), EngineError> {
    if sink.cancelled() {
        return Err(EngineError::Cancelled);
    }
    sink.emit(EngineEvent::StageChanged { stage });
    Ok(())
}

/// Log a pipeline decision; debug runs also forward it to the sink.
fn diagnose(config: &EngineConfig, sink: &mut dyn EventSink, message: String) {
    debug!("{message}");
    if config.debug {
        sink.emit(EngineEvent::Diagnostic { message });
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

fn open_document(path: &Path) -> Result<LopdfBackend, EngineError> {
    let read_error = |source: PdfError| EngineError::DocumentRead {
        path: path.to_path_buf(),
        source,
    };
    let bytes = std::fs::read(path).map_err(|e| read_error(e.into()))?;
    let backend = LopdfBackend::load_bytes(&bytes).map_err(read_error)?;
    debug!("opened {} ({} pages)", path.display(), backend.page_count());
    Ok(backend)
}

/// Extract every span, reporting each page. Nothing is returned if any page
/// fails.
fn scan(backend: &LopdfBackend, path: &Path, sink: &mut dyn EventSink) -> Result<Vec<TextSpan>, EngineError> {
    let total = backend.page_count();
    let mut spans = Vec::new();
    for page in iter_pages(backend) {
        if sink.cancelled() {
            return Err(EngineError::Cancelled);
        }
        let (index, page_spans) = page.map_err(|source| EngineError::DocumentRead {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("page {}/{}: {} spans", index + 1, total, page_spans.len());
        sink.emit(EngineEvent::PageScanned {
            page: index + 1,
            total,
            spans: page_spans.len(),
        });
        spans.extend(page_spans);
    }
    info!("extracted {} spans from {} pages", spans.len(), total);
    Ok(spans)
}

fn read_source(path: &Path) -> Result<String, EngineError> {
    std::fs::read_to_string(path).map_err(|source| EngineError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    })
}

fn load_bookmark_file(path: &Path) -> Result<Vec<SourceEntry>, EngineError> {
    let parse_error = |source: ParseError| EngineError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let format = SourceFormat::from_path(path).map_err(parse_error)?;
    let entries = parse_bookmark_source(&read_source(path)?, format).map_err(parse_error)?;
    info!("{} entries in {}", entries.len(), path.display());
    Ok(entries)
}

fn load_markdown(path: &Path) -> Result<Vec<SourceEntry>, EngineError> {
    let headings = parse_markdown_headings(&read_source(path)?);
    if headings.is_empty() {
        return Err(EngineError::Parse {
            path: path.to_path_buf(),
            source: ParseError::Empty("Markdown document"),
        });
    }
    info!("{} headings in {}", headings.len(), path.display());
    Ok(headings_to_entries(&headings))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn apply_outline(doc: &mut Document, forest: &[BookmarkNode], output: &Path) -> Result<(), EngineError> {
    let written = write_outline(doc, forest).map_err(|e| EngineError::write(output, e))?;
    debug!("outline has {written} items");
    Ok(())
}

fn save_document(doc: &mut Document, output: &Path) -> Result<(), EngineError> {
    doc.compress();
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| EngineError::write(output, e))?;
    write_atomically(output, &bytes)
}

/// Write to a temp file beside `path` and rename it over `path`, so a failed
/// run never leaves a partial file behind.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| EngineError::write(path, e))?;
    tmp.write_all(bytes).map_err(|e| EngineError::write(path, e))?;
    tmp.as_file().sync_all().map_err(|e| EngineError::write(path, e))?;
    tmp.persist(path).map_err(|e| EngineError::write(path, e.error))?;
    Ok(())
}

fn summary(output: &Path, forest: &[BookmarkNode]) -> RunSummary {
    RunSummary {
        output_path: output.display().to_string(),
        node_count: count_nodes(forest),
        unmatched_count: count_unresolved(forest),
        levels: max_depth(forest),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pdfmark_core::hierarchy::is_well_formed;
    use tempfile::TempDir;

    use super::*;
    use crate::config::{FontThreshold, Invocation, InvocationMode};
    use crate::error::ErrorKind;
    use crate::fixtures::{self, bold, line};

    fn save(dir: &TempDir, name: &str, doc: &mut Document) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, fixtures::to_bytes(doc)).unwrap();
        path
    }

    fn execute(inv: Invocation) -> (Result<RunSummary, EngineError>, Vec<EngineEvent>) {
        let config = EngineConfig::from_invocation(&inv).unwrap();
        let mut events = Vec::new();
        let result = run(&config, &mut |e: EngineEvent| events.push(e));
        (result, events)
    }

    fn stages(events: &[EngineEvent]) -> Vec<Stage> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::StageChanged { stage } => Some(*stage),
                _ => None,
            })
            .collect()
    }

    fn outline_of(path: &Path) -> Vec<BookmarkNode> {
        read_outline(&Document::load(path).unwrap()).unwrap()
    }

    /// Headings on pages 1 and 3 over body text on every page.
    fn report(dir: &TempDir) -> PathBuf {
        let mut doc = fixtures::document(&[
            vec![
                bold("1. Intro", 18.0, 72.0, 760.0),
                bold("1.1 Background", 14.0, 72.0, 720.0),
                line("This report describes the setup in some detail.", 11.0, 72.0, 690.0),
                line("It continues with more words on the first page.", 11.0, 72.0, 676.0),
            ],
            vec![line("The second page only carries running text here.", 11.0, 72.0, 760.0)],
            vec![
                bold("2. Methods", 18.0, 72.0, 760.0),
                line("Measurements were taken twice under load.", 11.0, 72.0, 730.0),
            ],
        ]);
        save(dir, "report.pdf", &mut doc)
    }

    fn expected_report_forest() -> Vec<BookmarkNode> {
        vec![
            BookmarkNode::new("Intro", Some(1), 1)
                .with_children(vec![BookmarkNode::new("Background", Some(1), 2)]),
            BookmarkNode::new("Methods", Some(3), 1),
        ]
    }

    #[test]
    fn test_auto_mode_numbered_headings() {
        let dir = tempfile::tempdir().unwrap();
        let input = report(&dir);
        let (result, events) = execute(Invocation {
            require_numeric_start: true,
            ..Invocation::new(&input, InvocationMode::Auto)
        });

        let summary = result.unwrap();
        assert_eq!(summary.node_count, 3);
        assert_eq!(summary.levels, 2);
        assert_eq!(summary.unmatched_count, 0);
        let output = dir.path().join("report_with_bookmarks.pdf");
        assert_eq!(PathBuf::from(&summary.output_path), output);
        assert_eq!(outline_of(&output), expected_report_forest());

        assert_eq!(
            stages(&events),
            vec![
                Stage::Extracting,
                Stage::Filtering,
                Stage::Classifying,
                Stage::BuildingTree,
                Stage::Writing,
                Stage::Done
            ]
        );
        let scanned = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::PageScanned { total: 3, .. }))
            .count();
        assert_eq!(scanned, 3);
        assert!(matches!(events.last(), Some(EngineEvent::Finished { .. })));
    }

    #[test]
    fn test_auto_mode_automatic_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let input = report(&dir);
        let output = dir.path().join("out").join("bookmarked.pdf");
        std::fs::create_dir(output.parent().unwrap()).unwrap();
        let (result, _) = execute(Invocation {
            font_threshold: Some(FontThreshold::Keyword("auto".into())),
            output_path: Some(output.clone()),
            ..Invocation::new(&input, InvocationMode::Auto)
        });
        assert_eq!(result.unwrap().node_count, 3);
        assert_eq!(outline_of(&output), expected_report_forest());
    }

    #[test]
    fn test_auto_mode_keeps_numbering_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let input = report(&dir);
        let (result, _) = execute(Invocation {
            require_numeric_start: true,
            keep_numbering: true,
            ..Invocation::new(&input, InvocationMode::Auto)
        });
        let output = PathBuf::from(result.unwrap().output_path);
        let titles: Vec<String> = outline_of(&output).into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["1. Intro", "2. Methods"]);
    }

    #[test]
    fn test_auto_mode_without_headings_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = save(&dir, "plain.pdf", &mut fixtures::blank_document(2));
        let (result, events) = execute(Invocation {
            require_numeric_start: true,
            ..Invocation::new(&input, InvocationMode::Auto)
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NoResult);
        assert!(!dir.path().join("plain_with_bookmarks.pdf").exists());
        assert!(!stages(&events).contains(&Stage::Writing));
        assert!(matches!(
            events.last(),
            Some(EngineEvent::Failed { failure }) if failure.error_kind == ErrorKind::NoResult
        ));
    }

    #[test]
    fn test_debug_run_reports_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let input = report(&dir);
        let diagnostics = |events: &[EngineEvent]| -> Vec<String> {
            events
                .iter()
                .filter_map(|e| match e {
                    EngineEvent::Diagnostic { message } => Some(message.clone()),
                    _ => None,
                })
                .collect()
        };

        let (result, events) = execute(Invocation {
            require_numeric_start: true,
            ..Invocation::new(&input, InvocationMode::Auto)
        });
        result.unwrap();
        assert!(diagnostics(&events).is_empty());

        let (result, events) = execute(Invocation {
            require_numeric_start: true,
            debug: true,
            ..Invocation::new(&input, InvocationMode::Auto)
        });
        result.unwrap();
        let messages = diagnostics(&events);
        assert!(messages.iter().any(|m| m.starts_with("font sizes: 18.0pt")));
        assert!(messages.iter().any(|m| m.contains("rejected") && m.contains("no numbering prefix")));
        assert!(messages.iter().any(|m| m.contains("level 2 \"1.1 Background\"")));
    }

    #[test]
    fn test_extract_csv_of_two_level_outline() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = fixtures::blank_document(4);
        let forest = vec![
            BookmarkNode::new("Part One", Some(1), 1).with_children(vec![
                BookmarkNode::new("Setup", Some(1), 2),
                BookmarkNode::new("Usage", Some(2), 2),
            ]),
            BookmarkNode::new("Part Two", Some(3), 1)
                .with_children(vec![BookmarkNode::new("Limits", Some(4), 2)]),
        ];
        write_outline(&mut doc, &forest).unwrap();
        let input = save(&dir, "manual.pdf", &mut doc);

        let (result, events) = execute(Invocation {
            format: "csv".parse().unwrap(),
            ..Invocation::new(&input, InvocationMode::ExtractOnly)
        });
        let summary = result.unwrap();
        assert_eq!(summary.node_count, 5);
        assert_eq!(
            stages(&events),
            vec![Stage::Extracting, Stage::Writing, Stage::Done]
        );

        let csv = std::fs::read_to_string(dir.path().join("manual_bookmarks.csv")).unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(
            rows,
            vec![
                "title,level,page",
                "Part One,1,1",
                "Setup,2,1",
                "Usage,2,2",
                "Part Two,1,3",
                "Limits,2,4"
            ]
        );
    }

    #[test]
    fn test_extract_without_outline_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = save(&dir, "bare.pdf", &mut fixtures::blank_document(1));
        let (result, events) = execute(Invocation::new(&input, InvocationMode::ExtractOnly));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NoResult);
        assert_eq!(stages(&events), vec![Stage::Extracting, Stage::Failed]);
        assert!(!dir.path().join("bare_bookmarks.json").exists());
    }

    #[test]
    fn test_bookmark_file_with_missing_title() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = fixtures::document(&[
            vec![line("Preface", 16.0, 72.0, 760.0)],
            vec![line("Nothing else is written here.", 11.0, 72.0, 760.0)],
        ]);
        let input = save(&dir, "book.pdf", &mut doc);
        let toc = dir.path().join("toc.txt");
        std::fs::write(&toc, "Preface\nChapter 1\n").unwrap();

        let (result, events) = execute(Invocation {
            bookmark_file_path: Some(toc),
            ..Invocation::new(&input, InvocationMode::BookmarkFileAssisted)
        });
        let summary = result.unwrap();
        assert_eq!(summary.node_count, 2);
        assert_eq!(summary.unmatched_count, 1);
        assert!(events.contains(&EngineEvent::TitleUnmatched {
            title: "Chapter 1".into()
        }));
        assert_eq!(
            stages(&events),
            vec![Stage::Extracting, Stage::BuildingTree, Stage::Writing, Stage::Done]
        );
        assert_eq!(
            outline_of(Path::new(&summary.output_path)),
            vec![
                BookmarkNode::new("Preface", Some(1), 1),
                BookmarkNode::new("Chapter 1", None, 1),
            ]
        );
    }

    #[test]
    fn test_bookmark_file_near_match_warns() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = fixtures::document(&[
            vec![line("Preface", 16.0, 72.0, 760.0)],
            vec![line("Experimental Setup and Results", 16.0, 72.0, 760.0)],
        ]);
        let input = save(&dir, "book.pdf", &mut doc);
        let toc = dir.path().join("toc.txt");
        std::fs::write(&toc, "Preface\nExperimental Setup & Result\n").unwrap();

        let (result, events) = execute(Invocation {
            bookmark_file_path: Some(toc),
            ..Invocation::new(&input, InvocationMode::BookmarkFileAssisted)
        });
        let forest = outline_of(Path::new(&result.unwrap().output_path));
        assert_eq!(forest[1].page, Some(2));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Warning { message } if message.contains("approximately"))));

        let (result, _) = execute(Invocation {
            bookmark_file_path: Some(dir.path().join("toc.txt")),
            fuzzy_match: false,
            output_path: Some(dir.path().join("exact.pdf")),
            ..Invocation::new(&input, InvocationMode::BookmarkFileAssisted)
        });
        assert_eq!(result.unwrap().unmatched_count, 1);
    }

    #[test]
    fn test_bookmark_file_without_any_match_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = fixtures::document(&[vec![line("Preface", 16.0, 72.0, 760.0)]]);
        let input = save(&dir, "book.pdf", &mut doc);
        let toc = dir.path().join("toc.txt");
        std::fs::write(&toc, "Chapter 1\nChapter 2\n").unwrap();

        let (result, events) = execute(Invocation {
            bookmark_file_path: Some(toc),
            ..Invocation::new(&input, InvocationMode::BookmarkFileAssisted)
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NoResult);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, EngineEvent::TitleUnmatched { .. }))
                .count(),
            2
        );
        assert!(!dir.path().join("book_with_bookmarks.pdf").exists());
    }

    #[test]
    fn test_bookmark_file_repeated_titles_move_forward() {
        let dir = tempfile::tempdir().unwrap();
        let mut pages: Vec<Vec<fixtures::Line>> = (0..6)
            .map(|_| vec![line("Filler text on this page.", 11.0, 72.0, 500.0)])
            .collect();
        pages[0].push(line("Intro", 14.0, 72.0, 760.0));
        pages[4].push(line("Intro", 14.0, 72.0, 760.0));
        pages[5].push(line("Methods", 14.0, 72.0, 760.0));
        let input = save(&dir, "dup.pdf", &mut fixtures::document(&pages));
        let toc = dir.path().join("toc.json");
        std::fs::write(&toc, r#"["Intro", "Intro", "Methods"]"#).unwrap();

        let (result, _) = execute(Invocation {
            bookmark_file_path: Some(toc),
            ..Invocation::new(&input, InvocationMode::BookmarkFileAssisted)
        });
        let forest = outline_of(Path::new(&result.unwrap().output_path));
        let found: Vec<Option<u32>> = forest.iter().map(|n| n.page).collect();
        assert_eq!(found, vec![Some(1), Some(5), Some(6)]);
    }

    #[test]
    fn test_markdown_outline_keeps_heading_depth() {
        let dir = tempfile::tempdir().unwrap();
        let input = report(&dir);
        let md = dir.path().join("outline.md");
        std::fs::write(&md, "## Intro\n\ntext\n\n### Background\n\n## Methods\n").unwrap();

        let (result, _) = execute(Invocation {
            markdown_file_path: Some(md),
            ..Invocation::new(&input, InvocationMode::MarkdownAssisted)
        });
        let forest = outline_of(Path::new(&result.unwrap().output_path));
        assert_eq!(forest, expected_report_forest());
        assert!(is_well_formed(&forest));
    }

    #[test]
    fn test_declared_page_out_of_range_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = save(&dir, "short.pdf", &mut fixtures::blank_document(2));
        let toc = dir.path().join("toc.csv");
        std::fs::write(&toc, "title,page\nStart,1\nEnd,7\n").unwrap();

        let (result, events) = execute(Invocation {
            bookmark_file_path: Some(toc),
            ..Invocation::new(&input, InvocationMode::BookmarkFileAssisted)
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Write);
        assert!(!dir.path().join("short_with_bookmarks.pdf").exists());
        assert!(matches!(
            events.last(),
            Some(EngineEvent::Failed { failure }) if failure.error_kind == ErrorKind::Write
        ));
    }

    #[test]
    fn test_unreadable_sources_fail_before_opening_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("never-opened.pdf");

        let (result, events) = execute(Invocation {
            bookmark_file_path: Some(dir.path().join("missing.txt")),
            ..Invocation::new(&input, InvocationMode::BookmarkFileAssisted)
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Config);
        assert!(!stages(&events).contains(&Stage::Extracting));

        let md = dir.path().join("empty.md");
        std::fs::write(&md, "no headings at all\n").unwrap();
        let (result, _) = execute(Invocation {
            markdown_file_path: Some(md),
            ..Invocation::new(&input, InvocationMode::MarkdownAssisted)
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_corrupt_pdf_is_document_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.pdf");
        std::fs::write(&input, b"%PDF-1.7\nthis is not a pdf").unwrap();

        let (result, events) = execute(Invocation::new(&input, InvocationMode::Auto));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::DocumentRead);
        assert_eq!(stages(&events), vec![Stage::Extracting, Stage::Failed]);
        assert!(!dir.path().join("broken_with_bookmarks.pdf").exists());
    }

    /// Records events and asks to stop once a page has been scanned.
    struct StopAfterFirstPage {
        events: Vec<EngineEvent>,
    }

    impl EventSink for StopAfterFirstPage {
        fn emit(&mut self, event: EngineEvent) {
            self.events.push(event);
        }

        fn cancelled(&self) -> bool {
            self.events
                .iter()
                .any(|e| matches!(e, EngineEvent::PageScanned { .. }))
        }
    }

    #[test]
    fn test_cancelled_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = report(&dir);
        let config = EngineConfig::from_invocation(&Invocation::new(&input, InvocationMode::Auto)).unwrap();
        let mut sink = StopAfterFirstPage { events: Vec::new() };

        let err = run(&config, &mut sink).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        let scanned = sink
            .events
            .iter()
            .filter(|e| matches!(e, EngineEvent::PageScanned { .. }))
            .count();
        assert_eq!(scanned, 1);
        assert!(matches!(sink.events.last(), Some(EngineEvent::Failed { .. })));
        assert!(!dir.path().join("report_with_bookmarks.pdf").exists());
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let summary = RunSummary {
            output_path: "out.pdf".into(),
            node_count: 3,
            unmatched_count: 1,
            levels: 2,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["outputPath"], "out.pdf");
        assert_eq!(json["nodeCount"], 3);
        assert_eq!(json["unmatchedCount"], 1);
    }
}
