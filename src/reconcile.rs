//! Cross-file key reconciliation.
//!
//! Compares one key column from each of two tables and reports the rows whose
//! key has no counterpart on the other side. Keys compare after trimming and
//! lowercasing only; this is a structured-key comparison, so none of the
//! fuzzy rules in [`crate::matcher`] apply. Rows with a blank key are always
//! unmatched.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use crate::parser::{ParsedTable, Row};

pub const PREVIEW_ROWS: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Key column '{column}' not found in {side} file")]
    UnknownKeyColumn { side: Side, column: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Left,
    Right,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "first"),
            Side::Right => write!(f, "second"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub total_a: usize,
    pub total_b: usize,
    pub matched_count: usize,
    pub only_in_a: Vec<Row>,
    pub only_in_b: Vec<Row>,
}

impl ReconciliationResult {
    pub fn unmatched_a(&self) -> usize {
        self.only_in_a.len()
    }

    pub fn unmatched_b(&self) -> usize {
        self.only_in_b.len()
    }

    pub fn preview_a(&self, limit: usize) -> &[Row] {
        &self.only_in_a[..limit.min(self.only_in_a.len())]
    }

    pub fn preview_b(&self, limit: usize) -> &[Row] {
        &self.only_in_b[..limit.min(self.only_in_b.len())]
    }
}

pub fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

fn key_set(table: &ParsedTable, key: &str) -> HashSet<String> {
    table
        .rows
        .iter()
        .map(|row| normalize_key(table.value(row, key)))
        .filter(|k| !k.is_empty())
        .collect()
}

fn unmatched(table: &ParsedTable, key: &str, other: &HashSet<String>) -> Vec<Row> {
    table
        .rows
        .iter()
        .filter(|row| {
            let normalized = normalize_key(table.value(row, key));
            normalized.is_empty() || !other.contains(&normalized)
        })
        .cloned()
        .collect()
}

pub fn reconcile(
    a: &ParsedTable,
    key_a: &str,
    b: &ParsedTable,
    key_b: &str,
) -> Result<ReconciliationResult, ReconcileError> {
    if !a.has_header(key_a) {
        return Err(ReconcileError::UnknownKeyColumn {
            side: Side::Left,
            column: key_a.to_string(),
        });
    }
    if !b.has_header(key_b) {
        return Err(ReconcileError::UnknownKeyColumn {
            side: Side::Right,
            column: key_b.to_string(),
        });
    }

    let values_a = key_set(a, key_a);
    let values_b = key_set(b, key_b);
    let only_in_a = unmatched(a, key_a, &values_b);
    let only_in_b = unmatched(b, key_b, &values_a);

    Ok(ReconciliationResult {
        total_a: a.row_count(),
        total_b: b.row_count(),
        matched_count: a.row_count() - only_in_a.len(),
        only_in_a,
        only_in_b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_csv_text;

    #[test]
    fn reconcile_reports_symmetric_difference() {
        let a = parse_csv_text("k\na\nb\nc", false).unwrap();
        let b = parse_csv_text("k\nb\nc\nd", false).unwrap();
        let result = reconcile(&a, "k", &b, "k").unwrap();
        assert_eq!(result.matched_count, 2);
        assert_eq!(result.only_in_a.len(), 1);
        assert_eq!(result.only_in_a[0]["k"], "a");
        assert_eq!(result.only_in_b.len(), 1);
        assert_eq!(result.only_in_b[0]["k"], "d");
    }

    #[test]
    fn reconcile_ignores_case_and_padding() {
        let a = parse_csv_text("k\n\" Foo \"", false).unwrap();
        let b = parse_csv_text("key\nfoo", false).unwrap();
        let result = reconcile(&a, "k", &b, "key").unwrap();
        assert_eq!(result.matched_count, 1);
        assert!(result.only_in_a.is_empty());
        assert!(result.only_in_b.is_empty());
    }

    #[test]
    fn reconcile_treats_blank_keys_as_unmatched() {
        let a = parse_csv_text("k,v\n,1\nx,2", false).unwrap();
        let b = parse_csv_text("k\nx\n\"\"", false).unwrap();
        let result = reconcile(&a, "k", &b, "k").unwrap();
        assert_eq!(result.matched_count, 1);
        assert_eq!(result.only_in_a.len(), 1);
        assert_eq!(result.only_in_a[0]["v"], "1");
        assert_eq!(result.only_in_b.len(), 1);
    }

    #[test]
    fn reconcile_rejects_unknown_key_columns() {
        let a = parse_csv_text("k\n1", false).unwrap();
        let err = reconcile(&a, "missing", &a, "k").unwrap_err();
        assert_eq!(
            err,
            ReconcileError::UnknownKeyColumn {
                side: Side::Left,
                column: "missing".into()
            }
        );
    }

    #[test]
    fn preview_is_bounded() {
        let body = (0..120).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let a = parse_csv_text(&format!("k\n{body}"), false).unwrap();
        let b = parse_csv_text("k\nnone", false).unwrap();
        let result = reconcile(&a, "k", &b, "k").unwrap();
        assert_eq!(result.unmatched_a(), 120);
        assert_eq!(result.preview_a(PREVIEW_ROWS).len(), PREVIEW_ROWS);
        assert_eq!(result.preview_b(PREVIEW_ROWS).len(), 1);
    }
}
