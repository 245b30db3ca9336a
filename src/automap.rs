use std::{fs, path::Path};

use anyhow::{Context, Result, anyhow};
use log::info;

use crate::{
    cli::{AutomapArgs, InputOptions},
    matcher::{IdentifierCatalog, MappingSource, ValueMapping, distinct_values, unmapped_values},
    preview::load_input,
    table,
};

pub fn load_mappings(path: &Path) -> Result<ValueMapping> {
    let text = fs::read_to_string(path).with_context(|| format!("Opening mappings {path:?}"))?;
    serde_json::from_str(&text).with_context(|| format!("Parsing mappings JSON {path:?}"))
}

pub fn save_mappings(mapping: &ValueMapping, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(mapping).context("Serializing mappings")?;
    fs::write(path, text).with_context(|| format!("Writing mappings {path:?}"))
}

/// Catalog files are read as plain CSV with a header row.
pub fn load_catalog_file(path: &Path, encoding: Option<&str>) -> Result<IdentifierCatalog> {
    let options = InputOptions {
        first_row_is_data: false,
        input_encoding: encoding.map(str::to_string),
    };
    let catalog = IdentifierCatalog::from_table(&load_input(path, &options)?);
    if catalog.is_empty() {
        return Err(anyhow!("Catalog {path:?} has no rows with an id column"));
    }
    Ok(catalog)
}

pub fn execute(args: &AutomapArgs) -> Result<()> {
    let parsed = load_input(&args.input, &args.input_options)?;
    if !parsed.has_header(&args.column) {
        return Err(anyhow!(
            "Column '{}' not found in {:?}",
            args.column,
            args.input
        ));
    }
    let catalog = load_catalog_file(&args.catalog, args.input_options.input_encoding.as_deref())?;
    let mut mapping = match &args.mappings {
        Some(path) if path.exists() => load_mappings(path)?,
        _ => ValueMapping::new(),
    };

    let values = distinct_values(&parsed, &args.column);
    let added = mapping.auto_map(values.iter().map(String::as_str), &catalog);
    let unmapped = unmapped_values(&parsed, &args.column, &mapping);
    info!(
        "Auto-mapped {} new value(s); {} of {} distinct value(s) still unmapped",
        added,
        unmapped.len(),
        values.len()
    );

    let headers = vec!["value".to_string(), "id".to_string(), "source".to_string()];
    let rows = values
        .iter()
        .map(|value| match mapping.entry(value) {
            Some(mapped) => vec![
                value.clone(),
                mapped.id.clone(),
                match mapped.source {
                    MappingSource::Manual => "manual".to_string(),
                    MappingSource::Auto => "auto".to_string(),
                },
            ],
            None => vec![value.clone(), String::new(), "unmapped".to_string()],
        })
        .collect::<Vec<_>>();
    eprint!("{}", table::render_table(&headers, &rows));
    eprintln!("Newly mapped: {added}; unmapped: {}", unmapped.len());

    match args.output.as_ref().or(args.mappings.as_ref()) {
        Some(path) => {
            save_mappings(&mapping, path)?;
            info!("Mappings written to {:?}", path);
        }
        None => println!(
            "{}",
            serde_json::to_string_pretty(&mapping).context("Serializing mappings")?
        ),
    }
    Ok(())
}
