#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use csv_migrate::store::Record;
use serde_json::json;
use tempfile::{TempDir, tempdir};

/// Profile for an events migration linked to contacts by legacy id.
pub const EVENTS_PROFILE: &str = r#"
target: events
fields:
  - { name: contact_ref, label: Contact, required: true }
  - { name: starts_at, label: Start, required: true }
  - { name: owner, label: Owner }
  - { name: title, label: Title }
columns:
  contact_ref: ContactID
reference:
  kind: contacts
  input_field: contact_ref
  legacy_field: legacy_id
  link_field: contact_id
  owner_field: owner_id
datetime_fields: [starts_at]
assignee:
  input_field: owner
  target_field: assigned_to
  catalog_kind: users
"#;

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    /// Writes `records` as `store/<kind>.json` and returns the store directory.
    pub fn write_store(&self, kind: &str, records: &[Record]) -> PathBuf {
        let text = serde_json::to_string_pretty(records).expect("serialize records");
        self.write(&format!("store/{kind}.json"), &text);
        self.path().join("store")
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path().join(name)).expect("read workspace file")
    }
}

/// Contacts with legacy ids 1..=count, each owned by `u1`.
pub fn contacts(count: usize) -> Vec<Record> {
    (1..=count)
        .map(|n| {
            Record::new(&format!("c{n}"))
                .with_field("legacy_id", json!(n))
                .with_field("owner_id", json!("u1"))
        })
        .collect()
}

pub fn users() -> Vec<Record> {
    vec![
        Record::new("u1")
            .with_field("full_name", json!("Ada Lovelace"))
            .with_field("username", json!("ada"))
            .with_field("email", json!("ada@example.com")),
        Record::new("u2")
            .with_field("full_name", json!("Grace Hopper"))
            .with_field("username", json!("ghopper")),
    ]
}
