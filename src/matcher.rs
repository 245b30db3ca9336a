//! Identifier normalization and catalog matching.
//!
//! Free-text identifiers from a CSV column (names, usernames, emails, raw IDs)
//! are resolved against an [`IdentifierCatalog`] with a two-tier score:
//!
//! | Tier | Score | Rule |
//! |---|---|---|
//! | exact | 100 | normalized value equals normalized full name, username, email, or id |
//! | containment | 70 | normalized full name or username contains the value, or the reverse |
//!
//! The best record wins, the first one on ties, and only scores of at least
//! [`MATCH_THRESHOLD`] count. Containment additionally requires the shorter
//! side to be at least [`MIN_CONTAINMENT_LEN`] characters so a lone initial
//! cannot claim a whole catalog.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::{
    parser::ParsedTable,
    store::Record,
};

pub const EXACT_SCORE: u8 = 100;
pub const CONTAINMENT_SCORE: u8 = 70;
pub const MATCH_THRESHOLD: u8 = CONTAINMENT_SCORE;
pub const MIN_CONTAINMENT_LEN: usize = 2;

/// Lowercases, strips diacritics, and drops everything outside `[a-z0-9]`.
pub fn normalize(value: &str) -> String {
    value
        .nfd()
        .flat_map(char::to_lowercase)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogRecord {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl CatalogRecord {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_full_name(mut self, value: &str) -> Self {
        self.full_name = Some(value.to_string());
        self
    }

    pub fn with_username(mut self, value: &str) -> Self {
        self.username = Some(value.to_string());
        self
    }

    pub fn with_email(mut self, value: &str) -> Self {
        self.email = Some(value.to_string());
        self
    }

    /// Full name, username, email, id: the strings a raw value may name.
    pub fn display_name_candidates(&self) -> Vec<&str> {
        [
            self.full_name.as_deref(),
            self.username.as_deref(),
            self.email.as_deref(),
            Some(self.id.as_str()),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

#[derive(Debug, Clone)]
struct NormalizedRecord {
    full_name: String,
    username: String,
    email: String,
    id: String,
}

impl NormalizedRecord {
    fn from_record(record: &CatalogRecord) -> Self {
        let norm = |v: &Option<String>| v.as_deref().map(normalize).unwrap_or_default();
        Self {
            full_name: norm(&record.full_name),
            username: norm(&record.username),
            email: norm(&record.email),
            id: normalize(&record.id),
        }
    }

    fn score(&self, value: &str) -> u8 {
        if value.is_empty() {
            return 0;
        }
        let exact = [&self.full_name, &self.username, &self.email, &self.id]
            .into_iter()
            .any(|field| !field.is_empty() && field == value);
        if exact {
            return EXACT_SCORE;
        }
        let contains = [&self.full_name, &self.username]
            .into_iter()
            .any(|field| contains_either_way(field, value));
        if contains { CONTAINMENT_SCORE } else { 0 }
    }
}

fn contains_either_way(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() || a.len().min(b.len()) < MIN_CONTAINMENT_LEN {
        return false;
    }
    a.contains(b) || b.contains(a)
}

/// Scores one raw value against one record.
pub fn score_record(raw: &str, record: &CatalogRecord) -> u8 {
    NormalizedRecord::from_record(record).score(&normalize(raw))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCandidate<'a> {
    pub record: &'a CatalogRecord,
    pub score: u8,
}

/// Canonical records loaded once per session; read-only while matching.
#[derive(Debug, Clone, Default)]
pub struct IdentifierCatalog {
    records: Vec<CatalogRecord>,
    normalized: Vec<NormalizedRecord>,
}

impl IdentifierCatalog {
    pub fn new(records: Vec<CatalogRecord>) -> Self {
        let normalized = records.iter().map(NormalizedRecord::from_record).collect();
        Self {
            records,
            normalized,
        }
    }

    /// Builds a catalog from a table with `id` and any of `full_name`,
    /// `username`, `email` headers, matched case-insensitively.
    pub fn from_table(table: &ParsedTable) -> Self {
        let find = |names: &[&str]| {
            table
                .headers
                .iter()
                .find(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
                .cloned()
        };
        let id_col = find(&["id", "user_id", "userid"]);
        let name_col = find(&["full_name", "fullname", "name"]);
        let username_col = find(&["username", "user_name", "login"]);
        let email_col = find(&["email", "e-mail", "mail"]);

        let pick = |row: &crate::parser::Row, col: &Option<String>| {
            col.as_ref()
                .and_then(|c| row.get(c))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let records = table
            .rows
            .iter()
            .filter_map(|row| {
                let id = pick(row, &id_col)?;
                Some(CatalogRecord {
                    id,
                    full_name: pick(row, &name_col),
                    username: pick(row, &username_col),
                    email: pick(row, &email_col),
                })
            })
            .collect();
        Self::new(records)
    }

    pub fn from_records(records: &[Record]) -> Self {
        let catalog = records
            .iter()
            .map(|record| CatalogRecord {
                id: record.id.clone(),
                full_name: record
                    .field_text("full_name")
                    .or_else(|| record.field_text("fullname"))
                    .or_else(|| record.field_text("name")),
                username: record.field_text("username"),
                email: record.field_text("email"),
            })
            .collect();
        Self::new(catalog)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    /// Highest-scoring qualifying record for `raw`, first wins on ties.
    pub fn best_match(&self, raw: &str) -> Option<MatchCandidate<'_>> {
        let value = normalize(raw);
        if value.is_empty() {
            return None;
        }
        let mut best: Option<MatchCandidate<'_>> = None;
        for (record, normalized) in self.records.iter().zip(&self.normalized) {
            let score = normalized.score(&value);
            if score < MATCH_THRESHOLD {
                continue;
            }
            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(MatchCandidate { record, score });
                if score == EXACT_SCORE {
                    break;
                }
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappedValue {
    pub id: String,
    pub source: MappingSource,
}

/// Raw CSV value → canonical id. Keys are stored trimmed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValueMapping {
    entries: BTreeMap<String, MappedValue>,
}

impl ValueMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manual assignments always replace whatever was there.
    pub fn set_manual(&mut self, raw: &str, id: &str) {
        self.entries.insert(
            raw.trim().to_string(),
            MappedValue {
                id: id.to_string(),
                source: MappingSource::Manual,
            },
        );
    }

    pub fn clear(&mut self, raw: &str) -> Option<MappedValue> {
        self.entries.remove(raw.trim())
    }

    pub fn get(&self, raw: &str) -> Option<&str> {
        self.entries.get(raw.trim()).map(|m| m.id.as_str())
    }

    pub fn entry(&self, raw: &str) -> Option<&MappedValue> {
        self.entries.get(raw.trim())
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.entries.contains_key(raw.trim())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MappedValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Maps every value without an existing entry to its best catalog match.
    /// Existing entries, manual or automatic, are never touched. Returns the
    /// number of newly mapped values.
    pub fn auto_map<'a, I>(&mut self, values: I, catalog: &IdentifierCatalog) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut added = 0;
        for raw in values {
            let key = raw.trim();
            if key.is_empty() || self.entries.contains_key(key) {
                continue;
            }
            if let Some(candidate) = catalog.best_match(key) {
                self.entries.insert(
                    key.to_string(),
                    MappedValue {
                        id: candidate.record.id.clone(),
                        source: MappingSource::Auto,
                    },
                );
                added += 1;
            }
        }
        added
    }
}

/// Distinct non-blank values of `column`, trimmed, in first-seen order.
pub fn distinct_values(table: &ParsedTable, column: &str) -> Vec<String> {
    table
        .rows
        .iter()
        .filter_map(|row| row.get(column))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unique()
        .map(str::to_string)
        .collect()
}

/// Distinct non-blank values of `column` that have no mapping yet.
pub fn unmapped_values(table: &ParsedTable, column: &str, mapping: &ValueMapping) -> Vec<String> {
    distinct_values(table, column)
        .into_iter()
        .filter(|v| !mapping.contains(v))
        .collect()
}
