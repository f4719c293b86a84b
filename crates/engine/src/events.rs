//! Typed progress events emitted by the pipeline.

use serde::Serialize;

use crate::engine::RunSummary;
use crate::error::Failure;

/// Pipeline stages, in the order a run moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Idle,
    Extracting,
    Filtering,
    Classifying,
    BuildingTree,
    Writing,
    Done,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::Idle => "idle",
            Stage::Extracting => "extracting",
            Stage::Filtering => "filtering",
            Stage::Classifying => "classifying",
            Stage::BuildingTree => "building tree",
            Stage::Writing => "writing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    StageChanged { stage: Stage },
    /// `page` is 1-based.
    PageScanned { page: usize, total: usize, spans: usize },
    CandidatesFound { kept: usize, rejected: usize },
    LevelsAssigned { levels: usize },
    TitleUnmatched { title: String },
    Warning { message: String },
    /// Filter, classifier and matcher details; only sent in debug runs.
    Diagnostic { message: String },
    Finished { summary: RunSummary },
    Failed { failure: Failure },
}

/// Receives events synchronously, in the order work completes.
pub trait EventSink {
    fn emit(&mut self, event: EngineEvent);

    /// Checked between stages and between pages; `true` stops the run
    /// before anything is written.
    fn cancelled(&self) -> bool {
        false
    }
}

impl<F> EventSink for F
where
    F: FnMut(EngineEvent),
{
    fn emit(&mut self, event: EngineEvent) {
        self(event)
    }
}
