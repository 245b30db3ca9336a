use anyhow::{Context, Result};
use chrono::Local;
use log::info;

use crate::{cli::CompareArgs, preview::load_input, reconcile, report};

pub fn execute(args: &CompareArgs) -> Result<()> {
    let left = load_input(&args.left, &args.input_options)?;
    let right = load_input(&args.right, &args.input_options)?;
    info!(
        "Comparing {:?} ({} row(s)) on '{}' with {:?} ({} row(s)) on '{}'",
        args.left,
        left.row_count(),
        args.left_key,
        args.right,
        right.row_count(),
        args.right_key
    );

    let result = reconcile::reconcile(&left, &args.left_key, &right, &args.right_key)?;
    print!(
        "{}",
        report::render_reconciliation(&result, &left.headers, &right.headers, args.preview_rows)
    );

    if let Some(dir) = &args.output_dir {
        let written = report::write_reconciliation_artifacts(
            &result,
            &left.headers,
            &right.headers,
            dir,
            Local::now().date_naive(),
        )
        .with_context(|| format!("Exporting unmatched rows to {dir:?}"))?;
        for path in &written {
            info!("Wrote {:?}", path);
        }
        if written.is_empty() {
            info!("Every row matched; no unmatched-row files written");
        }
    }
    Ok(())
}
