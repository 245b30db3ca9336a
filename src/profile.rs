//! Migration profiles.
//!
//! A profile is a YAML document describing what one kind of migration reads
//! and writes: the logical field schema, an optional starting column mapping,
//! how rows link to already-imported reference records, which fields hold
//! date-times, where the assignee comes from, and batch tuning.
//!
//! ```yaml
//! target: events
//! fields:
//!   - { name: contact_ref, label: Contact legacy ID, required: true }
//!   - { name: starts_at, label: Start, required: true }
//!   - { name: owner, label: Assigned user }
//!   - { name: title, label: Title }
//! columns:
//!   contact_ref: ContactID
//! reference:
//!   kind: contacts
//!   input_field: contact_ref
//!   legacy_field: legacy_id
//!   link_field: contact_id
//!   owner_field: owner_id
//! datetime_fields: [starts_at]
//! assignee:
//!   input_field: owner
//!   target_field: assigned_to
//!   catalog_kind: users
//! ```

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::mapping::{ColumnMapping, FieldSchema};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_FALLBACK_CONCURRENCY: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceSpec {
    /// Entity kind fetched to build the legacy-id index.
    pub kind: String,
    /// Logical field in the upload carrying the legacy id.
    pub input_field: String,
    /// Field on reference records holding the legacy id.
    pub legacy_field: String,
    /// Field on the created record that receives the reference record's id.
    pub link_field: String,
    /// Field on the reference record used when no assignee is mapped.
    #[serde(default)]
    pub owner_field: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssigneeSpec {
    pub input_field: String,
    pub target_field: String,
    #[serde(default = "default_catalog_kind")]
    pub catalog_kind: String,
    /// When false, rows without any resolvable assignee still get created.
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_catalog_kind() -> String {
    "users".to_string()
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_fallback_concurrency() -> usize {
    DEFAULT_FALLBACK_CONCURRENCY
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationProfile {
    pub target: String,
    pub fields: FieldSchema,
    #[serde(default)]
    pub columns: ColumnMapping,
    #[serde(default)]
    pub reference: Option<ReferenceSpec>,
    #[serde(default)]
    pub datetime_fields: Vec<String>,
    #[serde(default)]
    pub assignee: Option<AssigneeSpec>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_fallback_concurrency")]
    pub fallback_concurrency: usize,
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
}

impl MigrationProfile {
    pub fn new(target: &str, fields: FieldSchema) -> Self {
        Self {
            target: target.to_string(),
            fields,
            columns: ColumnMapping::new(),
            reference: None,
            datetime_fields: Vec::new(),
            assignee: None,
            batch_size: DEFAULT_BATCH_SIZE,
            fallback_concurrency: DEFAULT_FALLBACK_CONCURRENCY,
            call_timeout_secs: None,
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    pub fn is_datetime_field(&self, name: &str) -> bool {
        self.datetime_fields.iter().any(|f| f == name)
    }

    /// Checks that every field the profile refers to is declared in `fields`.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.target.trim().is_empty(), "Profile target kind is empty");
        ensure!(self.batch_size > 0, "batch_size must be greater than zero");
        let mut referenced = self.datetime_fields.iter().map(String::as_str).collect::<Vec<_>>();
        if let Some(reference) = &self.reference {
            referenced.push(&reference.input_field);
        }
        if let Some(assignee) = &self.assignee {
            referenced.push(&assignee.input_field);
        }
        referenced.extend(self.columns.iter().map(|(field, _)| field));
        for name in referenced {
            ensure!(
                self.fields.field(name).is_some(),
                "Profile refers to undeclared field '{name}'"
            );
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("Opening profile {path:?}"))?;
        let profile: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("Parsing profile YAML {path:?}"))?;
        profile
            .validate()
            .with_context(|| format!("Validating profile {path:?}"))?;
        Ok(profile)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_yaml::to_string(self).context("Serializing profile")?;
        fs::write(path, text).with_context(|| format!("Writing profile {path:?}"))
    }
}
