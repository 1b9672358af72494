//! Stage metrics
//!
//! Counters are recorded through the `metrics` facade; without an installed
//! recorder they are no-ops.

use crate::report::{SkipReason, StageReport};
use crate::types::Stage;

/// Metrics for the customers, products and sales stages
pub struct StageMetrics;

impl StageMetrics {
    /// Record the row counts of a finished stage, plus one skip counter per
    /// dropped or skipped record
    pub fn record_stage(report: &StageReport) {
        let stage = report.stage.as_str();
        ::metrics::counter!("fleximart_stage_input_rows_total", "stage" => stage)
            .increment(report.input_rows as u64);
        ::metrics::counter!("fleximart_stage_admissible_rows_total", "stage" => stage)
            .increment(report.admissible_rows as u64);
        ::metrics::counter!("fleximart_stage_committed_rows_total", "stage" => stage)
            .increment(report.committed_rows as u64);

        for record in report.dropped.iter().chain(&report.skipped) {
            Self::record_skipped(report.stage, &record.reason);
        }
    }

    pub fn record_skipped(stage: Stage, reason: &SkipReason) {
        ::metrics::counter!(
            "fleximart_records_skipped_total",
            "stage" => stage.as_str(),
            "reason" => reason.kind()
        )
        .increment(1);
    }

    pub fn record_stage_duration(stage: Stage, duration_secs: f64) {
        ::metrics::histogram!("fleximart_stage_duration_seconds", "stage" => stage.as_str())
            .record(duration_secs);
    }

    pub fn record_stage_aborted(stage: Stage) {
        ::metrics::counter!("fleximart_stage_aborted_total", "stage" => stage.as_str())
            .increment(1);
    }
}
