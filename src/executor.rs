//! Migration runs.
//!
//! A [`MigrationSession`] walks an explicit [`MigrationStep`] state machine:
//!
//! ```text
//! Upload -> Mapping -> Processing -> Results
//!              ^                        |
//!              +------- retry ----------+
//! ```
//!
//! plus `reset` back to `Upload` from anywhere. `Processing` is only entered
//! after the column mapping passes validation and the caller has either
//! mapped every assignee value or accepted the unmapped ones.
//!
//! Rows are resolved and created in fixed-size batches. Rows within a batch
//! run concurrently and the whole batch is awaited before the next starts.
//! Every row ends as exactly one success or one classified failure; a failing
//! row never stops the run.

use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::{
    error::{MigrationError, RowError},
    index::LegacyIndex,
    mapping::ColumnMapping,
    matcher::{IdentifierCatalog, ValueMapping, distinct_values, unmapped_values},
    parser::{ParsedTable, Row},
    profile::{DEFAULT_BATCH_SIZE, DEFAULT_FALLBACK_CONCURRENCY, MigrationProfile},
    report::MigrationOutcome,
    store::{RecordSink, ReferenceSource},
    values::{format_datetime, parse_datetime},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    Upload,
    Mapping,
    Processing,
    Results,
}

impl MigrationStep {
    pub fn name(self) -> &'static str {
        match self {
            MigrationStep::Upload => "Upload",
            MigrationStep::Mapping => "Mapping",
            MigrationStep::Processing => "Processing",
            MigrationStep::Results => "Results",
        }
    }

    fn advance(self, allowed_from: MigrationStep, to: MigrationStep) -> Result<Self, MigrationError> {
        if self == allowed_from {
            Ok(to)
        } else {
            Err(MigrationError::InvalidTransition {
                from: self.name(),
                to: to.name(),
            })
        }
    }

    /// `Upload -> Mapping`
    pub fn uploaded(self) -> Result<Self, MigrationError> {
        self.advance(MigrationStep::Upload, MigrationStep::Mapping)
    }

    /// `Mapping -> Processing`
    pub fn start(self) -> Result<Self, MigrationError> {
        self.advance(MigrationStep::Mapping, MigrationStep::Processing)
    }

    /// `Processing -> Results`
    pub fn finish(self) -> Result<Self, MigrationError> {
        self.advance(MigrationStep::Processing, MigrationStep::Results)
    }

    /// `Results -> Mapping`
    pub fn retry(self) -> Result<Self, MigrationError> {
        self.advance(MigrationStep::Results, MigrationStep::Mapping)
    }

    pub fn reset(self) -> Self {
        MigrationStep::Upload
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub batch_size: usize,
    pub fallback_concurrency: usize,
    pub call_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            fallback_concurrency: DEFAULT_FALLBACK_CONCURRENCY,
            call_timeout: None,
        }
    }
}

impl ExecutorConfig {
    pub fn from_profile(profile: &MigrationProfile) -> Self {
        Self {
            batch_size: profile.batch_size.max(1),
            fallback_concurrency: profile.fallback_concurrency.max(1),
            call_timeout: profile.call_timeout(),
        }
    }
}

/// Reported once per completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub batch: usize,
    pub batches: usize,
    pub batch_rows: usize,
    pub processed: usize,
    pub total: usize,
    pub failed: usize,
}

/// Read-only context for turning one uploaded row into create fields.
pub struct RowResolver<'a> {
    pub profile: &'a MigrationProfile,
    pub mapping: &'a ColumnMapping,
    pub assignees: &'a ValueMapping,
    /// `None` when the catalog could not be loaded; mapped ids are then trusted.
    pub catalog: Option<&'a IdentifierCatalog>,
    pub index: Option<&'a LegacyIndex>,
}

impl RowResolver<'_> {
    fn cell<'r>(&self, row: &'r Row, field: &str) -> Option<&'r str> {
        let header = self.mapping.header_for(field)?;
        row.get(header).map(|v| v.trim())
    }

    fn consumes(&self, field: &str) -> bool {
        self.profile
            .reference
            .as_ref()
            .is_some_and(|r| r.input_field == field)
            || self
                .profile
                .assignee
                .as_ref()
                .is_some_and(|a| a.input_field == field)
    }

    /// Builds the create payload for `row`: reference link, then date-times,
    /// then the assignee, then every other mapped field as text.
    pub fn resolve(&self, row: &Row) -> Result<Map<String, Value>, RowError> {
        let mut fields = Map::new();
        let mut owner = None;

        if let Some(spec) = &self.profile.reference {
            let legacy_id = self.cell(row, &spec.input_field).unwrap_or("");
            if legacy_id.is_empty() {
                return Err(RowError::MissingLegacyId {
                    column: self
                        .mapping
                        .header_for(&spec.input_field)
                        .unwrap_or(&spec.input_field)
                        .to_string(),
                });
            }
            let record = self
                .index
                .and_then(|index| index.lookup(legacy_id))
                .ok_or_else(|| RowError::ReferenceNotFound {
                    legacy_id: legacy_id.to_string(),
                })?;
            fields.insert(spec.link_field.clone(), Value::String(record.id.clone()));
            owner = spec
                .owner_field
                .as_deref()
                .and_then(|field| record.field_text(field));
        }

        for name in &self.profile.datetime_fields {
            let raw = self.cell(row, name).unwrap_or("");
            let required = self.profile.fields.field(name).is_some_and(|f| f.required);
            if raw.is_empty() && !required {
                continue;
            }
            let parsed = parse_datetime(raw).map_err(|_| RowError::InvalidDateTime {
                field: name.clone(),
                value: raw.to_string(),
            })?;
            fields.insert(name.clone(), Value::String(format_datetime(&parsed)));
        }

        if let Some(spec) = &self.profile.assignee {
            let raw = self.cell(row, &spec.input_field).unwrap_or("");
            let assignee = match self.assignees.get(raw).filter(|_| !raw.is_empty()) {
                Some(id) if self.catalog.is_none_or(|c| c.contains_id(id)) => Some(id.to_string()),
                Some(_) => {
                    return Err(RowError::UnknownAssignee {
                        value: raw.to_string(),
                    });
                }
                None => owner,
            };
            match assignee {
                Some(id) => {
                    fields.insert(spec.target_field.clone(), Value::String(id));
                }
                None if !raw.is_empty() => {
                    return Err(RowError::UnknownAssignee {
                        value: raw.to_string(),
                    });
                }
                None if spec.required => return Err(RowError::NoAssignee),
                None => {}
            }
        }

        for (field, header) in self.mapping.iter() {
            if self.consumes(field) || self.profile.is_datetime_field(field) {
                continue;
            }
            let value = row.get(header).map(|v| v.trim()).unwrap_or("");
            if !value.is_empty() {
                fields.insert(field.to_string(), Value::String(value.to_string()));
            }
        }

        Ok(fields)
    }
}

async fn process_row(
    resolver: &RowResolver<'_>,
    sink: &dyn RecordSink,
    row: &Row,
    timeout: Option<Duration>,
) -> Result<(), RowError> {
    let fields = resolver.resolve(row)?;
    let create = sink.create(&resolver.profile.target, fields);
    let created = match timeout {
        Some(limit) => tokio::time::timeout(limit, create)
            .await
            .map_err(|_| RowError::TimedOut {
                seconds: limit.as_secs(),
            })?,
        None => create.await,
    };
    created
        .map(|_| ())
        .map_err(|err| RowError::Create(err.to_string()))
}

/// Runs every row through `resolver` and `sink` in batches of
/// `config.batch_size`, calling `on_progress` after each batch.
pub async fn execute_batches<F>(
    rows: &[Row],
    resolver: &RowResolver<'_>,
    sink: &dyn RecordSink,
    config: &ExecutorConfig,
    mut on_progress: F,
) -> MigrationOutcome
where
    F: FnMut(&BatchProgress),
{
    let batch_size = config.batch_size.max(1);
    let total = rows.len();
    let batches = total.div_ceil(batch_size);
    let mut outcome = MigrationOutcome::new();

    for (batch_idx, batch) in rows.chunks(batch_size).enumerate() {
        let offset = batch_idx * batch_size;
        debug!(
            "Starting batch {}/{}: rows {}..{}",
            batch_idx + 1,
            batches,
            offset + 1,
            offset + batch.len()
        );
        let results = join_all(
            batch
                .iter()
                .map(|row| process_row(resolver, sink, row, config.call_timeout)),
        )
        .await;

        for (pos, result) in results.iter().enumerate() {
            if let Err(err) = result {
                debug!("Row {} failed: {}", offset + pos + 1, err);
            }
            outcome.record(result);
        }

        let progress = BatchProgress {
            batch: batch_idx + 1,
            batches,
            batch_rows: batch.len(),
            processed: (offset + batch_size).min(total),
            total,
            failed: outcome.failure_count,
        };
        info!(
            "Batch {}/{} done: {}/{} row(s) processed, {} failed so far",
            progress.batch, progress.batches, progress.processed, progress.total, progress.failed
        );
        on_progress(&progress);
    }

    outcome
}

/// Loads the assignee catalog, or `None` with a warning when the fetch fails.
pub async fn load_catalog(source: &dyn ReferenceSource, kind: &str) -> Option<IdentifierCatalog> {
    match source.fetch_all(kind).await {
        Ok(records) => {
            let catalog = IdentifierCatalog::from_records(&records);
            info!("Loaded {} {} catalog record(s)", catalog.len(), kind);
            Some(catalog)
        }
        Err(err) => {
            warn!("Could not load '{kind}' catalog ({err}); mapped assignees will not be checked");
            None
        }
    }
}

/// One migration from upload to results.
#[derive(Debug, Clone)]
pub struct MigrationSession {
    profile: MigrationProfile,
    step: MigrationStep,
    table: Option<ParsedTable>,
    mapping: ColumnMapping,
    assignees: ValueMapping,
    outcome: Option<MigrationOutcome>,
}

impl MigrationSession {
    pub fn new(profile: MigrationProfile) -> Self {
        Self {
            profile,
            step: MigrationStep::Upload,
            table: None,
            mapping: ColumnMapping::new(),
            assignees: ValueMapping::new(),
            outcome: None,
        }
    }

    pub fn step(&self) -> MigrationStep {
        self.step
    }

    pub fn profile(&self) -> &MigrationProfile {
        &self.profile
    }

    pub fn table(&self) -> Option<&ParsedTable> {
        self.table.as_ref()
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn assignees(&self) -> &ValueMapping {
        &self.assignees
    }

    pub fn outcome(&self) -> Option<&MigrationOutcome> {
        self.outcome.as_ref()
    }

    /// Accepts the parsed upload and seeds the column mapping from the
    /// profile, then from header names for fields the profile leaves open.
    pub fn upload(&mut self, table: ParsedTable) -> Result<(), MigrationError> {
        self.step = self.step.uploaded()?;
        let suggested = ColumnMapping::suggest(&self.profile.fields, &table.headers);
        let mut mapping = self.profile.columns.clone();
        for field in &self.profile.fields.fields {
            if mapping.header_for(&field.name).is_none() {
                mapping.set_mapping(&field.name, suggested.header_for(&field.name));
            }
        }
        self.mapping = mapping;
        self.table = Some(table);
        Ok(())
    }

    pub fn set_mapping(&mut self, field: &str, header: Option<&str>) {
        self.mapping.set_mapping(field, header);
    }

    pub fn set_assignees(&mut self, assignees: ValueMapping) {
        self.assignees = assignees;
    }

    pub fn map_assignee(&mut self, raw: &str, id: &str) {
        self.assignees.set_manual(raw, id);
    }

    /// Header currently feeding the assignee field, if any.
    pub fn assignee_column(&self) -> Option<&str> {
        let spec = self.profile.assignee.as_ref()?;
        self.mapping.header_for(&spec.input_field)
    }

    /// Auto-maps distinct assignee values against `catalog`; see
    /// [`ValueMapping::auto_map`].
    pub fn auto_map_assignees(&mut self, catalog: &IdentifierCatalog) -> usize {
        let (Some(table), Some(column)) = (self.table.as_ref(), self.assignee_column()) else {
            return 0;
        };
        let values = distinct_values(table, column);
        self.assignees
            .auto_map(values.iter().map(String::as_str), catalog)
    }

    pub fn unmapped_assignees(&self) -> Vec<String> {
        match (self.table.as_ref(), self.assignee_column()) {
            (Some(table), Some(column)) => unmapped_values(table, column, &self.assignees),
            _ => Vec::new(),
        }
    }

    /// Checks the mapping and returns assignee values that still lack a
    /// mapping, for the caller to confirm before [`MigrationSession::run`].
    pub fn preflight(&self) -> Result<Vec<String>, MigrationError> {
        let table = match (&self.table, self.step) {
            (Some(table), MigrationStep::Mapping) => table,
            _ => {
                return Err(MigrationError::InvalidTransition {
                    from: self.step.name(),
                    to: MigrationStep::Processing.name(),
                });
            }
        };
        self.mapping.ensure_ready(&self.profile.fields, table)?;
        Ok(self.unmapped_assignees())
    }

    /// Processes every uploaded row. Fails before any row is touched when
    /// pre-flight fails, or when assignee values are unmapped and
    /// `allow_unmapped` is false.
    pub async fn run<F>(
        &mut self,
        source: &dyn ReferenceSource,
        sink: &dyn RecordSink,
        allow_unmapped: bool,
        on_progress: F,
    ) -> Result<&MigrationOutcome, MigrationError>
    where
        F: FnMut(&BatchProgress),
    {
        let unmapped = self.preflight()?;
        if !unmapped.is_empty() && !allow_unmapped {
            return Err(MigrationError::UnmappedValues {
                count: unmapped.len(),
                values: unmapped,
            });
        }
        self.step = self.step.start()?;

        let config = ExecutorConfig::from_profile(&self.profile);
        let empty = ParsedTable {
            headers: Vec::new(),
            rows: Vec::new(),
        };
        let table = self.table.as_ref().unwrap_or(&empty);

        let catalog = match &self.profile.assignee {
            Some(spec) => load_catalog(source, &spec.catalog_kind).await,
            None => None,
        };
        let index = match &self.profile.reference {
            Some(spec) => {
                let wanted = self
                    .mapping
                    .header_for(&spec.input_field)
                    .map(|column| distinct_values(table, column))
                    .unwrap_or_default();
                Some(
                    LegacyIndex::load(
                        source,
                        &spec.kind,
                        &spec.legacy_field,
                        &wanted,
                        config.fallback_concurrency,
                    )
                    .await,
                )
            }
            None => None,
        };

        info!(
            "Migrating {} row(s) into '{}' in batches of {}",
            table.row_count(),
            self.profile.target,
            config.batch_size
        );
        let resolver = RowResolver {
            profile: &self.profile,
            mapping: &self.mapping,
            assignees: &self.assignees,
            catalog: catalog.as_ref(),
            index: index.as_ref(),
        };
        let outcome = execute_batches(&table.rows, &resolver, sink, &config, on_progress).await;
        info!(
            "Migration finished: {} succeeded, {} failed",
            outcome.success_count, outcome.failure_count
        );

        self.step = self.step.finish()?;
        let outcome = self.outcome.insert(outcome);
        Ok(&*outcome)
    }

    /// Returns to mapping with the same upload so the run can be repeated.
    pub fn retry(&mut self) -> Result<(), MigrationError> {
        self.step = self.step.retry()?;
        self.outcome = None;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.step = self.step.reset();
        self.table = None;
        self.mapping = ColumnMapping::new();
        self.assignees = ValueMapping::new();
        self.outcome = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_move_forward_and_back_to_mapping() {
        let step = MigrationStep::Upload.uploaded().unwrap();
        assert_eq!(step, MigrationStep::Mapping);
        let step = step.start().unwrap().finish().unwrap();
        assert_eq!(step, MigrationStep::Results);
        assert_eq!(step.retry().unwrap(), MigrationStep::Mapping);
        assert_eq!(MigrationStep::Processing.reset(), MigrationStep::Upload);
    }

    #[test]
    fn steps_reject_skips_and_reversals() {
        assert_eq!(
            MigrationStep::Upload.start(),
            Err(MigrationError::InvalidTransition {
                from: "Upload",
                to: "Processing"
            })
        );
        assert!(MigrationStep::Processing.retry().is_err());
        assert!(MigrationStep::Results.uploaded().is_err());
        assert!(MigrationStep::Mapping.finish().is_err());
    }

    #[test]
    fn executor_config_follows_profile() {
        let mut profile = MigrationProfile::new("events", Default::default());
        profile.batch_size = 0;
        profile.call_timeout_secs = Some(3);
        let config = ExecutorConfig::from_profile(&profile);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.call_timeout, Some(Duration::from_secs(3)));
    }
}
