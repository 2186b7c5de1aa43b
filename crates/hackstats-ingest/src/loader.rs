//! File loading
//!
//! Reads one spreadsheet (first sheet only) or delimited text file into a
//! [`Table`]. The first row becomes the header as-is; repairing it is the
//! schema normalizer's job. Any parse failure yields an error, never a
//! partially read table.

use crate::dedup::{HACKATHON_NAME_COLUMN, SUBMISSION_URL_COLUMN, USER_ID_COLUMN};
use crate::error::{IngestError, Result};
use crate::table::{name_key, Table, Value};
use calamine::{open_workbook_auto, Data, DataType, Reader};
use hackstats_common::validate::extension_of;
use std::path::Path;
use tracing::debug;

/// Delimiters considered when sniffing delimited text, in preference order
const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Columns whose text is an identity and must never become a float
const IDENTITY_COLUMNS: [&str; 3] = [SUBMISSION_URL_COLUMN, HACKATHON_NAME_COLUMN, USER_ID_COLUMN];

/// Number of leading lines inspected when sniffing the delimiter
const SNIFF_LINES: usize = 5;

/// Load a file into a table, dispatching on its extension
pub fn load(path: &Path) -> Result<Table> {
    let extension = extension_of(path).unwrap_or_default();
    let table = match extension.as_str() {
        "xlsx" | "xls" => load_spreadsheet(path)?,
        "csv" | "tsv" => {
            let bytes = std::fs::read(path)?;
            load_delimited(&bytes, extension == "tsv")?
        },
        other => {
            return Err(IngestError::unreadable(format!(
                "no loader for extension '{}'",
                other
            )))
        },
    };

    debug!(
        path = %path.display(),
        rows = table.row_count(),
        columns = table.column_count(),
        "Loaded table"
    );
    Ok(table)
}

/// Read the first worksheet of an Excel workbook
pub fn load_spreadsheet(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| IngestError::unreadable(format!("cannot open workbook: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::unreadable("workbook has no sheets"))?
        .map_err(|e| IngestError::unreadable(format!("cannot read first sheet: {}", e)))?;

    let mut rows = range.rows();
    let header = match rows.next() {
        Some(cells) => header_names(cells.iter().map(cell_to_value)),
        None => return Ok(Table::new()),
    };

    // every row of a calamine range spans the used width, header included
    let body: Vec<Vec<Value>> = rows
        .map(|cells| cells.iter().map(cell_to_value).collect())
        .collect();

    Table::from_rows(header, body)
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::Number(*i as f64),
        Data::Float(f) => Value::Number(*f),
        Data::String(s) => Value::Text(s.clone()),
        Data::Bool(b) => Value::Text(b.to_string()),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(ts) => Value::Timestamp(ts),
            None => Value::Text(cell.to_string()),
        },
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}

/// Decode and parse delimited text
///
/// Bytes are read as UTF-8 when valid and as Latin-1 otherwise; every byte
/// sequence decodes under Latin-1, so encoding alone never fails a load.
pub fn load_delimited(bytes: &[u8], prefer_tab: bool) -> Result<Table> {
    let text = decode(bytes);
    let delimiter = sniff_delimiter(&text, prefer_tab);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => {
            let record = record.map_err(|e| IngestError::unreadable(e.to_string()))?;
            header_names(record.iter().map(field_to_value))
        },
        None => return Ok(Table::new()),
    };

    let mut body: Vec<Vec<Value>> = Vec::new();
    for record in records {
        let record = record.map_err(|e| IngestError::unreadable(e.to_string()))?;
        body.push(record.iter().map(field_to_value).collect());
    }

    // a title line above the real header is narrower than the header it
    // sits on; pad it so header repair can promote the real one
    let mut header = header;
    if let Some(first) = body.first() {
        for index in header.len()..first.len() {
            header.push(format!("Unnamed: {}", index));
        }
    }

    let mut table = Table::from_rows(header, body)?;
    infer_numeric_columns(&mut table);
    Ok(table)
}

fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            debug!("Input is not valid UTF-8, decoding as Latin-1");
            bytes.iter().map(|&b| char::from(b)).collect()
        },
    }
}

/// Pick the delimiter that occurs most often, outside quotes, on the first
/// non-empty line that contains it at all (so a title line above the header
/// is looked past); ties are broken by [`DELIMITERS`] order, with tab
/// promoted to the front when `prefer_tab` is set
pub fn sniff_delimiter(text: &str, prefer_tab: bool) -> u8 {
    let mut candidates = DELIMITERS.to_vec();
    if prefer_tab {
        candidates.retain(|&d| d != b'\t');
        candidates.insert(0, b'\t');
    }

    let sample: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    let mut best = (candidates[0], 0usize, 0usize);
    for &delimiter in &candidates {
        let Some(header_count) = sample
            .iter()
            .map(|line| count_unquoted(line, delimiter))
            .find(|&count| count > 0)
        else {
            continue;
        };
        // lines agreeing with the header count make the choice more reliable
        let agreeing = sample
            .iter()
            .filter(|line| count_unquoted(line, delimiter) == header_count)
            .count();
        if (agreeing, header_count) > (best.2, best.1) {
            best = (delimiter, header_count, agreeing);
        }
    }
    best.0
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

fn field_to_value(field: &str) -> Value {
    if field.is_empty() {
        Value::Null
    } else {
        Value::Text(field.to_string())
    }
}

/// Header cells become column names; blank ones get the placeholder name the
/// schema normalizer recognises
fn header_names(cells: impl Iterator<Item = Value>) -> Vec<String> {
    cells
        .enumerate()
        .map(|(index, cell)| {
            if cell.is_blank() {
                format!("Unnamed: {}", index)
            } else {
                cell.render()
            }
        })
        .collect()
}

/// Parse a cell as a number only when rendering the number gives back the
/// same text, so leading zeros and digits beyond f64 precision survive
fn lossless_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .filter(|n| Value::Number(*n).render() == trimmed)
}

fn is_identity_column(name: &str) -> bool {
    let key = name_key(name);
    IDENTITY_COLUMNS.iter().any(|identity| name_key(identity) == key)
}

/// Convert columns whose every non-empty cell is losslessly numeric
///
/// Identity columns feeding the dedup key always stay text.
pub(crate) fn infer_numeric_columns(table: &mut Table) {
    for column in table.columns_mut() {
        if is_identity_column(&column.name) {
            continue;
        }
        let mut saw_number = false;
        let all_numeric = column.values.iter().all(|value| match value {
            Value::Null => true,
            Value::Text(s) if s.trim().is_empty() => true,
            Value::Text(s) => {
                saw_number = true;
                lossless_number(s).is_some()
            },
            _ => false,
        });
        if !(all_numeric && saw_number) {
            continue;
        }

        for value in column.values.iter_mut() {
            *value = match value {
                Value::Text(s) => lossless_number(s).map(Value::Number).unwrap_or(Value::Null),
                _ => Value::Null,
            };
        }
    }
}
