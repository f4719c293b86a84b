use std::io::IsTerminal;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use pdfmark_engine::{EngineEvent, Stage};

use crate::prelude::{eprintln, println, *};

/// How events reach the user.
enum Output {
    /// A spinner on stderr, for terminals.
    Spinner(ProgressBar),
    /// One colored line per notable event on stderr.
    Lines,
    /// One JSON object per event on stdout.
    Json,
}

pub struct Renderer {
    output: Output,
}

impl Renderer {
    pub fn new(json: bool) -> Self {
        let output = if json {
            Output::Json
        } else if std::io::stderr().is_terminal() {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
                spinner.set_style(style);
            }
            spinner.enable_steady_tick(std::time::Duration::from_millis(100));
            Output::Spinner(spinner)
        } else {
            Output::Lines
        };
        Self { output }
    }

    pub fn render(&mut self, event: &EngineEvent) {
        match &self.output {
            Output::Json => println!("{}", json_line(event)),
            Output::Spinner(spinner) => render_spinner(spinner, event),
            Output::Lines => render_line(event),
        }
    }
}

/// The event's JSON with a `timestamp` field added.
pub fn json_line(event: &EngineEvent) -> String {
    let mut value = serde_json::to_value(event).unwrap_or_default();
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "timestamp".to_string(),
            serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
        );
    }
    value.to_string()
}

fn render_spinner(spinner: &ProgressBar, event: &EngineEvent) {
    match event {
        EngineEvent::StageChanged { stage } => spinner.set_message(f!("{}...", capitalize(stage))),
        EngineEvent::PageScanned { page, total, .. } => {
            spinner.set_message(f!("Extracting text: page {page}/{total}"))
        }
        EngineEvent::CandidatesFound { kept, .. } => spinner.set_message(f!("Found {kept} heading candidates")),
        EngineEvent::TitleUnmatched { title } => {
            spinner.println(f!("{} {}", "not found:".yellow(), title));
        }
        EngineEvent::Warning { message } => spinner.println(f!("{} {}", "warning:".yellow(), message)),
        EngineEvent::Diagnostic { message } => spinner.println(f!("{}", message.dimmed())),
        EngineEvent::Finished { .. } | EngineEvent::Failed { .. } => {
            spinner.finish_and_clear();
            render_line(event);
        }
        EngineEvent::LevelsAssigned { .. } => {}
    }
}

fn render_line(event: &EngineEvent) {
    match event {
        EngineEvent::StageChanged { stage } if *stage != Stage::Done && *stage != Stage::Failed => {
            eprintln!("{}", f!("{}...", capitalize(stage)).dimmed());
        }
        EngineEvent::TitleUnmatched { title } => eprintln!("{} {}", "not found:".yellow(), title),
        EngineEvent::Warning { message } => eprintln!("{} {}", "warning:".yellow(), message),
        EngineEvent::Diagnostic { message } => eprintln!("{}", message.dimmed()),
        EngineEvent::Finished { summary } => {
            eprintln!(
                "{} {} bookmark(s), {} level(s) -> {}",
                "Done:".green().bold(),
                summary.node_count,
                summary.levels,
                summary.output_path.cyan()
            );
            if summary.unmatched_count > 0 {
                eprintln!(
                    "{}",
                    f!("{} title(s) could not be located and have no target page", summary.unmatched_count)
                        .yellow()
                );
            }
        }
        // The error itself is reported when the command returns.
        _ => {}
    }
}

fn capitalize(stage: &Stage) -> String {
    let label = stage.to_string();
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfmark_engine::RunSummary;

    #[test]
    fn test_json_line_adds_timestamp() {
        let line = json_line(&EngineEvent::Finished {
            summary: RunSummary {
                output_path: "out.pdf".into(),
                node_count: 4,
                unmatched_count: 0,
                levels: 2,
            },
        });
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "finished");
        assert_eq!(value["summary"]["nodeCount"], 4);
        assert!(value["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_json_line_carries_diagnostics() {
        let line = json_line(&EngineEvent::Diagnostic {
            message: "page 2: rejected \"42\": not title-like".into(),
        });
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "diagnostic");
        assert_eq!(value["message"], "page 2: rejected \"42\": not title-like");
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize(&Stage::BuildingTree), "Building tree");
    }
}
