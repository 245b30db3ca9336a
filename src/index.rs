//! Legacy-ID lookup index.
//!
//! Built once per run from the full reference collection, keyed both by the
//! trimmed legacy id and by its numeric form so `"007"` in the upload finds a
//! record stored with `7`. The first record wins when ids collide.
//!
//! If the bulk fetch fails the index is filled instead by one lookup per
//! distinct legacy id in the upload, at most `concurrency` in flight.

use std::collections::HashMap;

use futures::{StreamExt, stream};
use log::{debug, info, warn};

use crate::{
    store::{Record, ReferenceSource},
    values::legacy_numeric_key,
};

#[derive(Debug, Clone, Default)]
pub struct LegacyIndex {
    records: Vec<Record>,
    exact: HashMap<String, usize>,
    numeric: HashMap<String, usize>,
    degraded: bool,
}

impl LegacyIndex {
    pub fn build(records: Vec<Record>, legacy_field: &str) -> Self {
        let mut exact = HashMap::new();
        let mut numeric = HashMap::new();
        for (pos, record) in records.iter().enumerate() {
            let Some(legacy) = record.field_text(legacy_field) else {
                continue;
            };
            if let Some(key) = legacy_numeric_key(&legacy) {
                numeric.entry(key).or_insert(pos);
            }
            exact.entry(legacy).or_insert(pos);
        }
        Self {
            records,
            exact,
            numeric,
            degraded: false,
        }
    }

    pub fn lookup(&self, legacy_id: &str) -> Option<&Record> {
        let trimmed = legacy_id.trim();
        if trimmed.is_empty() {
            return None;
        }
        let pos = self.exact.get(trimmed).or_else(|| {
            legacy_numeric_key(trimmed).and_then(|key| self.numeric.get(&key))
        })?;
        self.records.get(*pos)
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    /// True when the index came from per-id lookups rather than a bulk fetch.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Fetches `kind` in full and indexes it by `legacy_field`, falling back to
    /// per-id lookups for `wanted` when the bulk fetch fails.
    pub async fn load(
        source: &dyn ReferenceSource,
        kind: &str,
        legacy_field: &str,
        wanted: &[String],
        concurrency: usize,
    ) -> Self {
        match source.fetch_all(kind).await {
            Ok(records) => {
                let index = Self::build(records, legacy_field);
                info!(
                    "Indexed {} {} record(s) by '{}'",
                    index.len(),
                    kind,
                    legacy_field
                );
                index
            }
            Err(err) => {
                warn!(
                    "Bulk fetch of '{kind}' failed ({err}); looking up {} legacy id(s) individually",
                    wanted.len()
                );
                let found = stream::iter(wanted.iter())
                    .map(|legacy| fetch_one(source, kind, legacy_field, legacy))
                    .buffer_unordered(concurrency.max(1))
                    .filter_map(|found| async move { found })
                    .collect::<Vec<_>>()
                    .await;
                let mut index = Self::build(found, legacy_field);
                index.degraded = true;
                index
            }
        }
    }
}

/// Looks up one legacy id by its trimmed text, then by its numeric form.
async fn fetch_one(
    source: &dyn ReferenceSource,
    kind: &str,
    legacy_field: &str,
    legacy: &str,
) -> Option<Record> {
    let trimmed = legacy.trim();
    if trimmed.is_empty() {
        return None;
    }
    let numeric = legacy_numeric_key(trimmed).filter(|key| key != trimmed);
    for candidate in std::iter::once(trimmed).chain(numeric.as_deref()) {
        match source.fetch_by_field(kind, legacy_field, candidate).await {
            Ok(Some(record)) => return Some(record),
            Ok(None) => {}
            Err(err) => debug!("Lookup of {kind} '{candidate}' failed: {err}"),
        }
    }
    None
}
