//! Record storage collaborators.
//!
//! The engine never owns persistence. It reads reference collections through
//! [`ReferenceSource`] and issues creates through [`RecordSink`]. Two
//! implementations ship with the crate: [`MemoryStore`] and
//! [`JsonFileStore`], which keeps one JSON array per entity kind in a
//! directory.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field rendered as trimmed text; strings and numbers only, blanks are `None`.
    pub fn field_text(&self, name: &str) -> Option<String> {
        let text = match self.fields.get(name)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRecord {
    pub id: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown entity kind '{0}'")]
    UnknownKind(String),
    #[error("{0}")]
    Domain(String),
}

#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn fetch_all(&self, kind: &str) -> Result<Vec<Record>, StoreError>;

    /// Single-record lookup used when a bulk fetch is unavailable.
    async fn fetch_by_field(
        &self,
        kind: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Record>, StoreError>;
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn create(&self, kind: &str, fields: Map<String, Value>)
    -> Result<CreatedRecord, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, Vec<Record>>>,
    created: Mutex<BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collections(collections: BTreeMap<String, Vec<Record>>) -> Self {
        Self {
            collections: Mutex::new(collections),
            created: Mutex::default(),
        }
    }

    pub async fn insert(&self, kind: &str, records: Vec<Record>) {
        self.collections
            .lock()
            .await
            .entry(kind.to_string())
            .or_default()
            .extend(records);
    }

    pub async fn records(&self, kind: &str) -> Vec<Record> {
        self.collections
            .lock()
            .await
            .get(kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Kinds that received at least one create.
    pub async fn modified_kinds(&self) -> Vec<String> {
        self.created.lock().await.iter().cloned().collect()
    }
}

#[async_trait]
impl ReferenceSource for MemoryStore {
    async fn fetch_all(&self, kind: &str) -> Result<Vec<Record>, StoreError> {
        self.collections
            .lock()
            .await
            .get(kind)
            .cloned()
            .ok_or_else(|| StoreError::UnknownKind(kind.to_string()))
    }

    async fn fetch_by_field(
        &self,
        kind: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Record>, StoreError> {
        let collections = self.collections.lock().await;
        let records = collections
            .get(kind)
            .ok_or_else(|| StoreError::UnknownKind(kind.to_string()))?;
        Ok(records
            .iter()
            .find(|r| r.field_text(field).as_deref() == Some(value.trim()))
            .cloned())
    }
}

#[async_trait]
impl RecordSink for MemoryStore {
    async fn create(
        &self,
        kind: &str,
        fields: Map<String, Value>,
    ) -> Result<CreatedRecord, StoreError> {
        let id = Uuid::new_v4().to_string();
        let record = Record {
            id: id.clone(),
            fields,
        };
        self.collections
            .lock()
            .await
            .entry(kind.to_string())
            .or_default()
            .push(record);
        self.created.lock().await.insert(kind.to_string());
        Ok(CreatedRecord { id })
    }
}

/// Directory of `<kind>.json` files, each a JSON array of records.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut collections = BTreeMap::new();
        let entries = fs::read_dir(dir).with_context(|| format!("Opening store directory {dir:?}"))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("Listing store directory {dir:?}"))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(kind) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let text =
                fs::read_to_string(&path).with_context(|| format!("Reading store file {path:?}"))?;
            let records: Vec<Record> = serde_json::from_str(&text)
                .with_context(|| format!("Parsing store file {path:?}"))?;
            debug!("Loaded {} {} record(s) from {:?}", records.len(), kind, path);
            collections.insert(kind.to_string(), records);
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            inner: MemoryStore::with_collections(collections),
        })
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Writes every kind that received creates back to disk.
    pub async fn save(&self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for kind in self.inner.modified_kinds().await {
            let records = self.inner.records(&kind).await;
            let path = self.dir.join(format!("{kind}.json"));
            let text = serde_json::to_string_pretty(&records).context("Serializing records")?;
            tokio::fs::write(&path, text)
                .await
                .with_context(|| format!("Writing store file {path:?}"))?;
            written.push(path);
        }
        Ok(written)
    }
}

#[async_trait]
impl ReferenceSource for JsonFileStore {
    async fn fetch_all(&self, kind: &str) -> Result<Vec<Record>, StoreError> {
        self.inner.fetch_all(kind).await
    }

    async fn fetch_by_field(
        &self,
        kind: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Record>, StoreError> {
        self.inner.fetch_by_field(kind, field, value).await
    }
}

#[async_trait]
impl RecordSink for JsonFileStore {
    async fn create(
        &self,
        kind: &str,
        fields: Map<String, Value>,
    ) -> Result<CreatedRecord, StoreError> {
        self.inner.create(kind, fields).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_field_text_renders_numbers_and_skips_blanks() {
        let record = Record::new("c1")
            .with_field("legacy_id", json!(7))
            .with_field("name", json!("  Ada "))
            .with_field("blank", json!(" "))
            .with_field("flag", json!(true));
        assert_eq!(record.field_text("legacy_id").as_deref(), Some("7"));
        assert_eq!(record.field_text("name").as_deref(), Some("Ada"));
        assert_eq!(record.field_text("blank"), None);
        assert_eq!(record.field_text("flag"), None);
    }

    #[test]
    fn record_serializes_fields_flat() {
        let record = Record::new("c1").with_field("legacy_id", json!("A1"));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({"id": "c1", "legacy_id": "A1"}));
    }

    #[tokio::test]
    async fn memory_store_creates_and_tracks_kinds() {
        let store = MemoryStore::new();
        assert!(store.fetch_all("events").await.is_err());

        let mut fields = Map::new();
        fields.insert("title".into(), json!("Kickoff"));
        let created = store.create("events", fields).await.unwrap();

        let events = store.fetch_all("events").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, created.id);
        assert_eq!(store.modified_kinds().await, vec!["events".to_string()]);
    }
}
