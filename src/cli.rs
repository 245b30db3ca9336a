use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::reconcile::PREVIEW_ROWS;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Migrate CSV data into an entity store and reconcile CSV files",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Preview the first few rows of a CSV or spreadsheet file
    Preview(PreviewArgs),
    /// Compare two files on a key column and export the unmatched rows
    Compare(CompareArgs),
    /// Auto-map raw identifier values in a column to catalog ids
    Automap(AutomapArgs),
    /// Create one record per row according to a migration profile
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Clone)]
pub struct InputOptions {
    /// Treat the first row as data and name columns Column1..ColumnN
    #[arg(long = "first-row-is-data")]
    pub first_row_is_data: bool,
    /// Character encoding of delimited input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Input file (`-` reads CSV from stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    #[command(flatten)]
    pub input_options: InputOptions,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// First file
    #[arg(long)]
    pub left: PathBuf,
    /// Second file
    #[arg(long)]
    pub right: PathBuf,
    /// Key column in the first file
    #[arg(long = "left-key")]
    pub left_key: String,
    /// Key column in the second file
    #[arg(long = "right-key")]
    pub right_key: String,
    /// Directory receiving the unmatched-row CSV files
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: Option<PathBuf>,
    /// Maximum unmatched rows shown per side
    #[arg(long = "preview-rows", default_value_t = PREVIEW_ROWS)]
    pub preview_rows: usize,
    #[command(flatten)]
    pub input_options: InputOptions,
}

#[derive(Debug, Args)]
pub struct AutomapArgs {
    /// File holding the raw identifier values
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Column with the raw identifier values
    #[arg(short = 'c', long = "column")]
    pub column: String,
    /// Catalog CSV with id, full_name, username, email columns
    #[arg(long)]
    pub catalog: PathBuf,
    /// Existing value mapping JSON to extend
    #[arg(short = 'm', long = "mappings")]
    pub mappings: Option<PathBuf>,
    /// Where to write the updated mapping (defaults to --mappings, else stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub input_options: InputOptions,
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// File whose rows become records
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Migration profile YAML
    #[arg(short = 'p', long = "profile")]
    pub profile: PathBuf,
    /// Store directory holding one `<kind>.json` array per entity kind
    #[arg(short = 's', long = "store")]
    pub store: PathBuf,
    /// Assignee value mapping JSON
    #[arg(short = 'm', long = "mappings")]
    pub mappings: Option<PathBuf>,
    /// Column overrides of the form `field=Header` (empty header clears)
    #[arg(long = "map", action = clap::ArgAction::Append, value_parser = parse_field_override)]
    pub overrides: Vec<(String, String)>,
    /// Skip auto-mapping assignee values against the user catalog
    #[arg(long = "no-automap")]
    pub no_automap: bool,
    /// Proceed even when some assignee values have no mapping
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
    /// Run every row but leave the store files untouched
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    #[command(flatten)]
    pub input_options: InputOptions,
}

fn parse_field_override(value: &str) -> Result<(String, String), String> {
    let (field, header) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected field=Header, got '{value}'"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("Missing field name in '{value}'"));
    }
    Ok((field.to_string(), header.trim().to_string()))
}
