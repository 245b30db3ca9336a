//! File loading, CSV export, and artifact naming.
//!
//! All file I/O in csv-migrate flows through this module:
//!
//! - **Format detection**: extension-based (`.csv`/`.txt` → delimited text,
//!   `.xlsx`/`.xlsm`/`.xlsb`/`.xls`/`.ods` → spreadsheet). Anything else is
//!   rejected with [`ParseError::UnsupportedFileFormat`].
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//! - **stdin**: the `-` path convention reads delimited text from stdin.
//! - **Export**: every field quoted, inner quotes doubled, `\n` row endings,
//!   which [`crate::parser::parse_csv_text`] reads back losslessly.

use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use csv::{QuoteStyle, Terminator};
use encoding_rs::{Encoding, UTF_8};

use crate::{
    error::ParseError,
    parser::{self, ParsedTable, Row},
    spreadsheet,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Delimited,
    Spreadsheet,
}

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn detect_format(path: &Path) -> Result<InputFormat, ParseError> {
    if is_dash(path) {
        return Ok(InputFormat::Delimited);
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "csv" | "txt" => Ok(InputFormat::Delimited),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(InputFormat::Spreadsheet),
        _ => Err(ParseError::UnsupportedFileFormat {
            path: path.to_path_buf(),
            extension,
        }),
    }
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

fn read_input_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if is_dash(path) {
        io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("Reading stdin")?;
    } else {
        bytes = fs::read(path).with_context(|| format!("Opening input file {path:?}"))?;
    }
    Ok(bytes)
}

/// Loads a CSV or spreadsheet file fully into memory as a [`ParsedTable`].
pub fn load_table(
    path: &Path,
    first_row_is_data: bool,
    encoding: &'static Encoding,
) -> Result<ParsedTable> {
    let table = match detect_format(path)? {
        InputFormat::Delimited => {
            let bytes = read_input_bytes(path)?;
            let text = decode_bytes(&bytes, encoding)
                .with_context(|| format!("Decoding {path:?}"))?;
            parser::parse_csv_text(&text, first_row_is_data)?
        }
        InputFormat::Spreadsheet => {
            let grid = spreadsheet::read_first_sheet(path)?;
            parser::from_grid(grid, first_row_is_data)?
        }
    };
    Ok(table)
}

/// Renders rows as CSV text with every field quoted.
pub fn export_csv(headers: &[String], rows: &[Row]) -> Result<String> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .quote_style(QuoteStyle::Always)
        .double_quote(true)
        .terminator(Terminator::Any(b'\n'));
    let mut writer = builder.from_writer(Vec::new());
    writer
        .write_record(headers)
        .context("Writing export headers")?;
    for (idx, row) in rows.iter().enumerate() {
        let values = headers
            .iter()
            .map(|h| row.get(h).map(String::as_str).unwrap_or(""));
        writer
            .write_record(values)
            .with_context(|| format!("Writing export row {}", idx + 1))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow!("Flushing export buffer: {}", err.error()))?;
    String::from_utf8(bytes).context("Export produced invalid UTF-8")
}

/// `{stem}_{YYYY-MM-DD}.csv`
pub fn artifact_file_name(stem: &str, date: NaiveDate) -> String {
    format!("{stem}_{}.csv", date.format("%Y-%m-%d"))
}

pub fn write_artifact(dir: &Path, stem: &str, date: NaiveDate, contents: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Creating output directory {dir:?}"))?;
    let path = dir.join(artifact_file_name(stem, date));
    fs::write(&path, contents).with_context(|| format!("Writing artifact {path:?}"))?;
    Ok(path)
}
