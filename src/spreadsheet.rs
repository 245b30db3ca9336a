use std::path::Path;

use anyhow::{Result, anyhow};
use calamine::{Data, Reader, open_workbook_auto};

use crate::error::ParseError;

const SHEET_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reads the first worksheet of a workbook into a grid of display strings,
/// skipping rows with no content.
pub fn read_first_sheet(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| anyhow!("Opening workbook {:?}: {}", path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ParseError::NoWorksheet {
            path: path.to_path_buf(),
        })?
        .map_err(|e| anyhow!("Error reading first sheet of {:?}: {}", path, e))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
        .filter(|cells| cells.iter().any(|cell| !cell.trim().is_empty()))
        .collect())
}

/// Renders one cell the way the same value would read in a CSV export:
/// strings trimmed, date cells as `%Y-%m-%d %H:%M:%S`.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        // Whole floats come back from most writers for integer cells.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::DateTime(dt) if !dt.is_duration() => match dt.as_datetime() {
            Some(value) => value.format(SHEET_DATETIME_FORMAT).to_string(),
            None => dt.as_f64().to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};

    use crate::values::{format_datetime, parse_datetime};

    #[test]
    fn cell_to_string_renders_integral_floats_without_fraction() {
        assert_eq!(cell_to_string(&Data::Float(7.0)), "7");
        assert_eq!(cell_to_string(&Data::Float(7.5)), "7.5");
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String("x".into())), "x");
    }

    #[test]
    fn cell_to_string_trims_text_like_unquoted_csv_fields() {
        assert_eq!(cell_to_string(&Data::String("  Ada Lovelace \t".into())), "Ada Lovelace");
        assert_eq!(cell_to_string(&Data::String("   ".into())), "");
    }

    #[test]
    fn date_cells_render_as_parseable_timestamps() {
        let cell = Data::DateTime(ExcelDateTime::new(45776.4375, ExcelDateTimeType::DateTime, false));
        let rendered = cell_to_string(&cell);
        assert_eq!(rendered, "2025-04-29 10:30:00");
        let parsed = parse_datetime(&rendered).expect("date cell parses");
        assert_eq!(format_datetime(&parsed), "2025-04-29T10:30:00Z");

        let day_only = Data::DateTime(ExcelDateTime::new(45776.0, ExcelDateTimeType::DateTime, false));
        assert_eq!(cell_to_string(&day_only), "2025-04-29 00:00:00");
    }

    #[test]
    fn iso_date_cells_pass_through() {
        let cell = Data::DateTimeIso("2025-04-29T10:30:00".into());
        assert_eq!(cell_to_string(&cell), "2025-04-29T10:30:00");
        assert!(parse_datetime(&cell_to_string(&cell)).is_ok());
    }
}
