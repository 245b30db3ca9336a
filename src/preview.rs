use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::{InputOptions, PreviewArgs},
    io_utils,
    parser::ParsedTable,
    table,
};

/// Loads `path` honoring the shared input flags.
pub fn load_input(path: &Path, options: &InputOptions) -> Result<ParsedTable> {
    let encoding = io_utils::resolve_encoding(options.input_encoding.as_deref())?;
    io_utils::load_table(path, options.first_row_is_data, encoding)
        .with_context(|| format!("Loading {path:?}"))
}

pub fn execute(args: &PreviewArgs) -> Result<()> {
    let parsed = load_input(&args.input, &args.input_options)?;
    let rows = parsed.preview(args.rows);
    print!("{}", table::render_rows(&parsed.headers, rows));
    info!(
        "Displayed {} of {} row(s) from {:?}",
        rows.len(),
        parsed.row_count(),
        args.input
    );
    Ok(())
}
