//! Outcome accounting and rendering.
//!
//! Migration failures are bucketed into a fixed taxonomy by substring match on
//! the failure message; each bucket keeps a count and up to
//! [`MAX_EXAMPLES_PER_REASON`] example messages. Comparison results render as
//! a summary plus downloadable CSV artifacts of the unmatched rows.

use std::{collections::BTreeMap, fmt, path::Path, path::PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    error::RowError,
    io_utils,
    parser::Row,
    reconcile::ReconciliationResult,
    table,
};

pub const MAX_EXAMPLES_PER_REASON: usize = 5;
pub const UNMATCHED_A_STEM: &str = "unmatched_in_csv1";
pub const UNMATCHED_B_STEM: &str = "unmatched_in_csv2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FailureReason {
    MissingRequiredMapping,
    ReferenceNotFound,
    InvalidDateTime,
    UnmappedOrUnknownAssignee,
    NoAssigneeAvailable,
    Other,
}

impl FailureReason {
    pub fn label(self) -> &'static str {
        match self {
            FailureReason::MissingRequiredMapping => "Missing required mapping",
            FailureReason::ReferenceNotFound => "Reference not found",
            FailureReason::InvalidDateTime => "Invalid date",
            FailureReason::UnmappedOrUnknownAssignee => "Unmapped or unknown assignee",
            FailureReason::NoAssigneeAvailable => "No assignee available",
            FailureReason::Other => "Other",
        }
    }

    /// Buckets a failure message. Unrecognized messages fall into `Other`.
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("missing required mapping") {
            FailureReason::MissingRequiredMapping
        } else if lowered.contains("reference not found") {
            FailureReason::ReferenceNotFound
        } else if lowered.contains("invalid date") {
            FailureReason::InvalidDateTime
        } else if lowered.contains("no assignee") {
            FailureReason::NoAssigneeAvailable
        } else if lowered.contains("unknown assignee") || lowered.contains("unmapped") {
            FailureReason::UnmappedOrUnknownAssignee
        } else {
            FailureReason::Other
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<&RowError> for FailureReason {
    fn from(err: &RowError) -> Self {
        match err {
            RowError::ReferenceNotFound { .. } | RowError::MissingLegacyId { .. } => {
                FailureReason::ReferenceNotFound
            }
            RowError::InvalidDateTime { .. } => FailureReason::InvalidDateTime,
            RowError::UnknownAssignee { .. } => FailureReason::UnmappedOrUnknownAssignee,
            RowError::NoAssignee => FailureReason::NoAssigneeAvailable,
            RowError::TimedOut { .. } => FailureReason::Other,
            RowError::Create(message) => FailureReason::classify(message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    pub success_count: usize,
    pub failure_count: usize,
    pub failures_by_reason: BTreeMap<FailureReason, usize>,
    pub failure_examples: BTreeMap<FailureReason, Vec<String>>,
}

impl MigrationOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> usize {
        self.success_count + self.failure_count
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    pub fn record_failure(&mut self, reason: FailureReason, message: &str) {
        self.failure_count += 1;
        *self.failures_by_reason.entry(reason).or_insert(0) += 1;
        let examples = self.failure_examples.entry(reason).or_default();
        if examples.len() < MAX_EXAMPLES_PER_REASON {
            examples.push(message.to_string());
        }
    }

    pub fn record_error(&mut self, err: &RowError) {
        self.record_failure(FailureReason::from(err), &err.to_string());
    }

    pub fn record(&mut self, result: &Result<(), RowError>) {
        match result {
            Ok(()) => self.record_success(),
            Err(err) => self.record_error(err),
        }
    }

    pub fn count_for(&self, reason: FailureReason) -> usize {
        self.failures_by_reason.get(&reason).copied().unwrap_or(0)
    }

    pub fn examples_for(&self, reason: FailureReason) -> &[String] {
        self.failure_examples
            .get(&reason)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub fn render_outcome(outcome: &MigrationOutcome) -> String {
    let mut output = format!(
        "Processed {} row(s): {} succeeded, {} failed\n",
        outcome.total(),
        outcome.success_count,
        outcome.failure_count
    );
    if outcome.failures_by_reason.is_empty() {
        return output;
    }
    let headers = vec!["reason".to_string(), "count".to_string(), "example".to_string()];
    let mut rows = Vec::new();
    for (reason, count) in &outcome.failures_by_reason {
        let examples = outcome.examples_for(*reason);
        for (idx, example) in examples.iter().enumerate() {
            let (label, count) = if idx == 0 {
                (reason.label().to_string(), count.to_string())
            } else {
                (String::new(), String::new())
            };
            rows.push(vec![label, count, example.clone()]);
        }
    }
    output.push('\n');
    output.push_str(&table::render_table(&headers, &rows));
    output
}

pub fn render_reconciliation(
    result: &ReconciliationResult,
    headers_a: &[String],
    headers_b: &[String],
    preview_rows: usize,
) -> String {
    let summary_headers = vec!["measure".to_string(), "rows".to_string()];
    let summary = [
        ("total in first file", result.total_a),
        ("total in second file", result.total_b),
        ("matched", result.matched_count),
        ("only in first file", result.unmatched_a()),
        ("only in second file", result.unmatched_b()),
    ]
    .into_iter()
    .map(|(label, count)| vec![label.to_string(), count.to_string()])
    .collect::<Vec<_>>();

    let mut output = table::render_table(&summary_headers, &summary);
    let sections = [
        ("Only in first file", result.preview_a(preview_rows), headers_a, result.unmatched_a()),
        ("Only in second file", result.preview_b(preview_rows), headers_b, result.unmatched_b()),
    ];
    for (title, preview, headers, total) in sections {
        if preview.is_empty() {
            continue;
        }
        output.push_str(&format!("\n{title} (showing {} of {total}):\n", preview.len()));
        output.push_str(&table::render_rows(headers, preview));
    }
    output
}

/// Writes one CSV per non-empty unmatched side into `dir`.
pub fn write_reconciliation_artifacts(
    result: &ReconciliationResult,
    headers_a: &[String],
    headers_b: &[String],
    dir: &Path,
    date: NaiveDate,
) -> Result<Vec<PathBuf>> {
    let sides: [(&str, &[String], &[Row]); 2] = [
        (UNMATCHED_A_STEM, headers_a, result.only_in_a.as_slice()),
        (UNMATCHED_B_STEM, headers_b, result.only_in_b.as_slice()),
    ];
    let mut written = Vec::new();
    for (stem, headers, rows) in sides {
        if rows.is_empty() {
            continue;
        }
        let contents = io_utils::export_csv(headers, rows)?;
        written.push(io_utils::write_artifact(dir, stem, date, &contents)?);
    }
    Ok(written)
}
