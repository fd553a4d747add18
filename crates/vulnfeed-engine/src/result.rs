//! Run lifecycle state and result types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use vulnfeed_types::state::{Checkpoint, FeedId};

use crate::errors::PipelineError;

/// Lifecycle of one run. `Failed` is reachable from any state after `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    LoadingCheckpoint,
    Ingesting,
    Emitting,
    PersistingCheckpoint,
    Done,
    Failed,
}

impl RunState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LoadingCheckpoint => "loading_checkpoint",
            Self::Ingesting => "ingesting",
            Self::Emitting => "emitting",
            Self::PersistingCheckpoint => "persisting_checkpoint",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate record counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    /// Vendor records received from the fetcher or decoder.
    pub fetched: u64,
    /// Records that converted successfully.
    pub converted: u64,
    /// Records dropped after a conversion failure.
    pub skipped: u64,
    /// Records confirmed written to the sink.
    pub emitted: u64,
}

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct RunResult {
    pub feed: FeedId,
    pub state: RunState,
    pub counts: RunCounts,
    /// Checkpoint the run started from.
    pub since: Checkpoint,
    pub started_at: DateTime<Utc>,
    /// Checkpoint persisted at the end, if any.
    pub checkpoint: Option<Checkpoint>,
    pub duration_secs: f64,
    /// Last state reached before a failure.
    pub failed_in: Option<RunState>,
    pub error: Option<PipelineError>,
}

impl RunResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done && self.error.is_none()
    }

    /// Machine-readable summary line.
    #[must_use]
    pub fn summary_json(&self) -> serde_json::Value {
        serde_json::json!({
            "feed": self.feed.as_str(),
            "state": self.state,
            "since": self.since.to_rfc3339(),
            "started_at": self.started_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "checkpoint": self.checkpoint.map(Checkpoint::to_rfc3339),
            "counts": self.counts,
            "duration_secs": self.duration_secs,
            "failed_in": self.failed_in,
            "error": self.error.as_ref().map(ToString::to_string),
            "error_category": self.error.as_ref().map(PipelineError::category),
        })
    }

    /// Convert into a `Result`, keeping the summary on success.
    ///
    /// # Errors
    ///
    /// Returns the terminal [`PipelineError`] of a failed run.
    pub fn into_result(mut self) -> Result<Self, PipelineError> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}
