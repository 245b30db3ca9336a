//! Logical field → source column mapping.
//!
//! A [`FieldSchema`] lists the logical fields a migration understands; a
//! [`ColumnMapping`] records which uploaded header feeds each of them. Two
//! fields may point at the same header.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{error::MigrationError, parser::ParsedTable};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: Some(label.to_string()),
            required: true,
        }
    }

    pub fn optional(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: Some(label.to_string()),
            required: false,
        }
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FieldSchema {
    pub fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ColumnMapping {
    entries: BTreeMap<String, String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `header` to `field`, or clears the mapping for `None` or a
    /// blank header.
    pub fn set_mapping(&mut self, field: &str, header: Option<&str>) {
        match header.map(str::trim).filter(|h| !h.is_empty()) {
            Some(header) => {
                self.entries.insert(field.to_string(), header.to_string());
            }
            None => {
                self.entries.remove(field);
            }
        }
    }

    pub fn header_for(&self, field: &str) -> Option<&str> {
        self.entries.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(f, h)| (f.as_str(), h.as_str()))
    }

    /// Required fields of `schema` that are still unmapped, in schema order.
    pub fn validate(&self, schema: &FieldSchema) -> Vec<String> {
        schema
            .required_fields()
            .filter(|f| self.header_for(&f.name).is_none())
            .map(|f| f.name.clone())
            .collect()
    }

    /// Rejects the mapping while any required field is unmapped or any
    /// mapped header is absent from `table`.
    pub fn ensure_ready(
        &self,
        schema: &FieldSchema,
        table: &ParsedTable,
    ) -> Result<(), MigrationError> {
        let missing = self.validate(schema);
        if !missing.is_empty() {
            return Err(MigrationError::MissingRequiredMapping { fields: missing });
        }
        if let Some((_, header)) = self.iter().find(|(_, h)| !table.has_header(h)) {
            return Err(MigrationError::UnknownColumn {
                column: header.to_string(),
            });
        }
        Ok(())
    }

    /// Pre-fills fields whose name or label matches a header case-insensitively.
    pub fn suggest(schema: &FieldSchema, headers: &[String]) -> Self {
        let mut mapping = Self::new();
        for field in &schema.fields {
            let matched = headers.iter().find(|h| {
                h.eq_ignore_ascii_case(&field.name) || h.eq_ignore_ascii_case(field.display_label())
            });
            if let Some(header) = matched {
                mapping.set_mapping(&field.name, Some(header));
            }
        }
        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FieldSchema {
        FieldSchema::new(vec![
            FieldSpec::required("legacy_id", "Legacy ID"),
            FieldSpec::required("scheduled_at", "Date"),
            FieldSpec::optional("assignee", "Assignee"),
        ])
    }

    #[test]
    fn validate_lists_unmapped_required_fields() {
        let mut mapping = ColumnMapping::new();
        mapping.set_mapping("legacy_id", Some("ref"));
        assert_eq!(mapping.validate(&schema()), vec!["scheduled_at"]);

        mapping.set_mapping("scheduled_at", Some("when"));
        assert!(mapping.validate(&schema()).is_empty());

        mapping.set_mapping("scheduled_at", None);
        assert_eq!(mapping.validate(&schema()), vec!["scheduled_at"]);
    }

    #[test]
    fn set_mapping_allows_shared_headers_and_clears_blank() {
        let mut mapping = ColumnMapping::new();
        mapping.set_mapping("legacy_id", Some("ref"));
        mapping.set_mapping("assignee", Some("ref"));
        assert_eq!(mapping.header_for("assignee"), Some("ref"));

        mapping.set_mapping("assignee", Some("  "));
        assert_eq!(mapping.header_for("assignee"), None);
    }

    #[test]
    fn suggest_matches_names_and_labels_case_insensitively() {
        let headers = vec!["LEGACY_ID".to_string(), "date".to_string(), "x".to_string()];
        let mapping = ColumnMapping::suggest(&schema(), &headers);
        assert_eq!(mapping.header_for("legacy_id"), Some("LEGACY_ID"));
        assert_eq!(mapping.header_for("scheduled_at"), Some("date"));
        assert_eq!(mapping.header_for("assignee"), None);
    }
}
