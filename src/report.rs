use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::resolver::IdentifierError;
use crate::storage::SinkRejection;
use crate::types::Stage;

/// Why a record did not become a committed row
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Collapsed by within-batch deduplication
    #[error("duplicate of an earlier record ({key})")]
    Duplicate { key: String },

    /// A required field is missing or unusable; never sent to the sink
    #[error("inadmissible: {field} {problem}")]
    Inadmissible { field: &'static str, problem: String },

    #[error("malformed identifier: {0}")]
    IdentifierMalformed(#[from] IdentifierError),

    #[error("rejected by sink: {0}")]
    SinkRejected(#[from] SinkRejection),
}

impl SkipReason {
    pub fn inadmissible(field: &'static str, problem: impl Into<String>) -> Self {
        SkipReason::Inadmissible {
            field,
            problem: problem.into(),
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::Duplicate { .. } => "duplicate",
            SkipReason::Inadmissible { .. } => "inadmissible",
            SkipReason::IdentifierMalformed(_) => "identifier_malformed",
            SkipReason::SinkRejected(_) => "sink_rejected",
        }
    }
}

/// A record that was dropped or skipped, with the id used in logs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub record_id: String,
    pub reason: SkipReason,
}

/// The loader's verdict for a single record: the sink-assigned key, or why
/// the record was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    pub record_id: String,
    pub result: std::result::Result<i64, SkipReason>,
}

/// Counts and skip log for one stage
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub input_rows: usize,
    pub admissible_rows: usize,
    pub committed_rows: usize,
    /// Records removed by cleaning or deduplication
    pub dropped: Vec<SkippedRecord>,
    /// Admissible records the loader could not commit
    pub skipped: Vec<SkippedRecord>,
}

impl StageReport {
    /// Fold per-record load outcomes into stage counts
    pub fn from_outcomes(
        stage: Stage,
        input_rows: usize,
        dropped: Vec<SkippedRecord>,
        outcomes: Vec<RecordOutcome>,
    ) -> Self {
        let admissible_rows = outcomes.len();
        let mut committed_rows = 0;
        let mut skipped = Vec::new();

        for outcome in outcomes {
            match outcome.result {
                Ok(_) => committed_rows += 1,
                Err(reason) => skipped.push(SkippedRecord {
                    record_id: outcome.record_id,
                    reason,
                }),
            }
        }

        Self {
            stage,
            input_rows,
            admissible_rows,
            committed_rows,
            dropped,
            skipped,
        }
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Emit the stage summary
    pub fn log(&self) {
        for record in &self.dropped {
            warn!(stage = %self.stage, record = %record.record_id, "Dropped record: {}", record.reason);
        }
        for record in &self.skipped {
            warn!(stage = %self.stage, record = %record.record_id, "Skipped record: {}", record.reason);
        }
        info!(
            stage = %self.stage,
            input = self.input_rows,
            admissible = self.admissible_rows,
            committed = self.committed_rows,
            skipped = self.skipped.len(),
            "Stage finished"
        );
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    pub fn start(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }

    pub fn total_committed(&self) -> usize {
        self.stages.iter().map(|s| s.committed_rows).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.stages.iter().map(StageReport::skipped_count).sum()
    }
}
