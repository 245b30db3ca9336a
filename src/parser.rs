//! Tabular input parsing.
//!
//! Raw delimited text and spreadsheet grids are both normalized into a
//! [`ParsedTable`]: an ordered header list plus one header → value mapping per
//! row. Every row carries a value for every header; short rows are padded
//! with empty strings and surplus cells are dropped.
//!
//! The line tokenizer is permissive rather than strict RFC 4180:
//! quotes only matter when they open a field, `""` inside a quoted field is an
//! escaped quote, and unquoted fields are trimmed. Text after a closing quote
//! is kept; whitespace between it and the delimiter is not.

use std::collections::{BTreeMap, HashSet};

use crate::error::ParseError;

pub type Row = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl ParsedTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Returns the first `limit` rows without touching the full table.
    pub fn preview(&self, limit: usize) -> &[Row] {
        &self.rows[..limit.min(self.rows.len())]
    }

    /// Cell values of `row` in header order.
    pub fn row_values(&self, row: &Row) -> Vec<String> {
        self.headers
            .iter()
            .map(|h| row.get(h).cloned().unwrap_or_default())
            .collect()
    }

    pub fn value<'a>(&self, row: &'a Row, header: &str) -> &'a str {
        row.get(header).map(String::as_str).unwrap_or("")
    }
}

/// Splits one CSV line into fields.
pub fn tokenize_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    // Whitespace after a closing quote, kept only if more field text follows.
    let mut pending = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
            continue;
        }
        match ch {
            '"' if !quoted && current.trim().is_empty() => {
                current.clear();
                in_quotes = true;
                quoted = true;
            }
            ',' => {
                fields.push(finish_field(std::mem::take(&mut current), quoted));
                pending.clear();
                quoted = false;
            }
            c if quoted && c.is_whitespace() => pending.push(c),
            c => {
                current.push_str(&pending);
                pending.clear();
                current.push(c);
            }
        }
    }
    fields.push(finish_field(current, quoted));
    fields
}

fn finish_field(field: String, quoted: bool) -> String {
    if quoted {
        field
    } else {
        field.trim().to_string()
    }
}

/// Parses CSV text into a table.
///
/// With `first_row_is_data` unset the first non-blank line supplies headers;
/// otherwise every line is data and headers are synthesized as `ColumnN`.
pub fn parse_csv_text(text: &str, first_row_is_data: bool) -> Result<ParsedTable, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let grid = text
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(tokenize_line)
        .collect::<Vec<_>>();
    from_grid(grid, first_row_is_data)
}

/// Builds a table from a 2-D cell grid such as a spreadsheet's first sheet.
pub fn from_grid(grid: Vec<Vec<String>>, first_row_is_data: bool) -> Result<ParsedTable, ParseError> {
    let mut lines = grid;
    if lines.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let headers = if first_row_is_data {
        let width = lines.iter().map(Vec::len).max().unwrap_or_default();
        synthetic_headers(width)
    } else {
        let header_cells = lines.remove(0);
        build_headers(&header_cells)
    };

    let rows = lines
        .into_iter()
        .map(|cells| {
            headers
                .iter()
                .enumerate()
                .map(|(idx, header)| (header.clone(), cells.get(idx).cloned().unwrap_or_default()))
                .collect::<Row>()
        })
        .collect();

    Ok(ParsedTable { headers, rows })
}

fn synthetic_headers(count: usize) -> Vec<String> {
    (1..=count).map(|idx| format!("Column{idx}")).collect()
}

/// Blank header cells become `Column{N}`; repeated names get a numeric suffix
/// so every header stays a unique row key. Cells are taken as tokenized, so a
/// quoted header keeps its padding the way a quoted data cell does.
fn build_headers(cells: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    cells
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let base = if cell.trim().is_empty() {
                format!("Column{}", idx + 1)
            } else {
                cell.clone()
            };
            let mut candidate = base.clone();
            let mut suffix = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{base}_{suffix}");
                suffix += 1;
            }
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_line_trims_unquoted_fields() {
        assert_eq!(tokenize_line(" a , b ,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn tokenize_line_keeps_quoted_content_verbatim() {
        assert_eq!(
            tokenize_line(r#""a,""b""", x"#),
            vec![r#"a,"b""#.to_string(), "x".to_string()]
        );
        assert_eq!(tokenize_line(r#"" padded ",1"#), vec![" padded ", "1"]);
    }

    #[test]
    fn tokenize_line_treats_inner_quotes_as_literal() {
        assert_eq!(tokenize_line(r#"5" screen,ok"#), vec![r#"5" screen"#, "ok"]);
    }

    #[test]
    fn tokenize_line_keeps_text_after_closing_quote() {
        assert_eq!(tokenize_line(r#""Smith" Jr,x"#), vec!["Smith Jr", "x"]);
        assert_eq!(tokenize_line(r#""a"  b  c ,d"#), vec!["a  b  c", "d"]);
        assert_eq!(tokenize_line("\"a\"  ,b"), vec!["a", "b"]);
        assert_eq!(tokenize_line("x,\"a\" \t"), vec!["x", "a"]);
    }

    #[test]
    fn tokenize_line_emits_trailing_empty_field() {
        assert_eq!(tokenize_line("a,"), vec!["a", ""]);
        assert_eq!(tokenize_line(""), vec![""]);
    }

    #[test]
    fn tokenize_line_strips_carriage_return() {
        assert_eq!(tokenize_line("a,\"b\"\r"), vec!["a", "b"]);
        assert_eq!(tokenize_line("a,b\r"), vec!["a", "b"]);
    }

    #[test]
    fn from_grid_pads_short_rows_and_drops_surplus_cells() {
        let grid = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["1".to_string()],
            vec!["2".to_string(), "3".to_string(), "4".to_string()],
        ];
        let table = from_grid(grid, false).unwrap();
        assert_eq!(table.rows[0]["b"], "");
        assert_eq!(table.rows[1].len(), 2);
    }

    #[test]
    fn from_grid_sizes_synthetic_headers_to_widest_row() {
        let grid = vec![vec!["x".to_string()], vec!["y".to_string(), "z".to_string()]];
        let table = from_grid(grid, true).unwrap();
        assert_eq!(table.headers, vec!["Column1", "Column2"]);
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn build_headers_suffixes_duplicates() {
        let headers = build_headers(&["id".into(), "id".into(), "".into()]);
        assert_eq!(headers, vec!["id", "id_2", "Column3"]);
    }

    #[test]
    fn quoted_headers_keep_padding() {
        let table = parse_csv_text("\" a \",b\n1,2\n", false).unwrap();
        assert_eq!(table.headers, vec![" a ", "b"]);
        assert_eq!(table.rows[0][" a "], "1");

        let blank = parse_csv_text("\"  \",b\n1,2\n", false).unwrap();
        assert_eq!(blank.headers, vec!["Column1", "b"]);
    }
}
