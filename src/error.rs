//! Typed errors for parsing, pre-flight validation, and per-row migration
//! failures.
//!
//! Row-level messages carry the keywords the failure classifier in
//! [`crate::report`] looks for, so a typed failure and its rendered message
//! land in the same bucket.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Input is empty: no non-blank lines found")]
    EmptyInput,
    #[error("Unsupported file format '{extension}' for {path:?}")]
    UnsupportedFileFormat { path: PathBuf, extension: String },
    #[error("Spreadsheet {path:?} has no worksheets")]
    NoWorksheet { path: PathBuf },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("Missing required mapping for field(s): {}", .fields.join(", "))]
    MissingRequiredMapping { fields: Vec<String> },
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
    #[error("Column '{column}' is not present in the uploaded file")]
    UnknownColumn { column: String },
    #[error("{count} value(s) have no assignee mapping: {}", .values.join(", "))]
    UnmappedValues { count: usize, values: Vec<String> },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("Reference not found for legacy id '{legacy_id}'")]
    ReferenceNotFound { legacy_id: String },
    #[error("Missing legacy id value in column '{column}'; reference not found")]
    MissingLegacyId { column: String },
    #[error("Invalid date '{value}' in field '{field}'")]
    InvalidDateTime { field: String, value: String },
    #[error("Unknown assignee '{value}': unmapped or not in user catalog")]
    UnknownAssignee { value: String },
    #[error("No assignee available for row")]
    NoAssignee,
    #[error("Create call timed out after {seconds}s")]
    TimedOut { seconds: u64 },
    #[error("{0}")]
    Create(String),
}
