use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    automap::{load_mappings, save_mappings},
    cli::MigrateArgs,
    error::MigrationError,
    executor::{self, MigrationSession},
    preview::load_input,
    profile::MigrationProfile,
    report,
    session::{CachedSource, ClientSession},
    store::JsonFileStore,
};

pub fn execute(args: &MigrateArgs) -> Result<()> {
    let profile = MigrationProfile::load(&args.profile)?;
    let table = load_input(&args.input, &args.input_options)?;
    let store = JsonFileStore::open(&args.store)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Starting async runtime")?;
    runtime.block_on(run(args, profile, table, &store))
}

async fn run(
    args: &MigrateArgs,
    profile: MigrationProfile,
    table: crate::parser::ParsedTable,
    store: &JsonFileStore,
) -> Result<()> {
    let client = ClientSession::new(None);
    let source = CachedSource::new(store, &client);
    let mut session = MigrationSession::new(profile);
    session.upload(table)?;
    for (field, header) in &args.overrides {
        session.set_mapping(field, Some(header));
    }
    if let Some(path) = args.mappings.as_ref().filter(|p| p.exists()) {
        session.set_assignees(load_mappings(path)?);
    }

    if !args.no_automap {
        let catalog_kind = session
            .profile()
            .assignee
            .as_ref()
            .map(|spec| spec.catalog_kind.clone());
        if let Some(kind) = catalog_kind {
            if let Some(catalog) = executor::load_catalog(&source, &kind).await {
                let added = session.auto_map_assignees(&catalog);
                info!("Auto-mapped {added} assignee value(s) against '{kind}'");
            }
        }
    }

    let unmapped = session.preflight()?;
    if !unmapped.is_empty() {
        warn!(
            "{} assignee value(s) have no mapping: {}",
            unmapped.len(),
            unmapped.join(", ")
        );
        if !args.yes {
            return Err(MigrationError::UnmappedValues {
                count: unmapped.len(),
                values: unmapped,
            })
            .context("Map the values or rerun with --yes to fall back to reference owners");
        }
    }

    let outcome = session
        .run(&source, store, args.yes, |progress| {
            eprintln!("Processed {}/{} row(s)", progress.processed, progress.total);
        })
        .await?;
    print!("{}", report::render_outcome(outcome));

    if args.dry_run {
        info!("Dry run: store files left unchanged");
        return Ok(());
    }
    for path in store.save().await? {
        info!("Wrote {:?}", path);
    }
    if let Some(path) = &args.mappings {
        save_mappings(session.assignees(), path)?;
    }
    Ok(())
}
