//! Header repair
//!
//! Exports often arrive with a title or blank row above the real header, so
//! the header the loader saw is a row of placeholders and the real names sit
//! in the first data row. [`normalize_headers`] promotes that row, cleans
//! every name and makes names unique.

use crate::error::Result;
use crate::loader::infer_numeric_columns;
use crate::table::{name_key, Table};
use hackstats_common::text::clean_string;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Repair, clean and de-duplicate the header of a freshly loaded table
pub fn normalize_headers(mut table: Table) -> Result<Table> {
    let placeholder = Regex::new(r"^Unnamed(:\s*\d+)?")?;

    let malformed = table
        .columns()
        .iter()
        .any(|column| is_malformed_name(&column.name, &placeholder));

    if malformed && table.row_count() > 0 {
        let promoted: Vec<String> = table
            .row(0)
            .into_iter()
            .map(|value| value.render())
            .collect();
        debug!(header = ?promoted, "Promoting first data row to header");

        table.rename_columns(promoted)?;
        table.skip_first_row();
        // the promoted row kept numeric columns as text
        infer_numeric_columns(&mut table);
    }

    let cleaned: Vec<String> = table
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let name = clean_string(column.name.trim_start_matches(BYTE_ORDER_MARK));
            if name.is_empty() {
                format!("Unnamed: {}", index)
            } else {
                name
            }
        })
        .collect();

    table.rename_columns(dedupe_names(cleaned))?;
    Ok(table)
}

/// Missing, numeric, or an auto-generated placeholder
fn is_malformed_name(name: &str, placeholder: &Regex) -> bool {
    let trimmed = name.trim_start_matches(BYTE_ORDER_MARK).trim();
    trimmed.is_empty() || is_numeric_name(trimmed) || placeholder.is_match(trimmed)
}

/// Digits with at most one decimal point, as a numeric header cell renders;
/// words that happen to parse as floats (`NaN`, `inf`) are names
fn is_numeric_name(name: &str) -> bool {
    let unsigned = name.strip_prefix('-').unwrap_or(name);
    let mut digits = 0;
    let mut points = 0;
    for c in unsigned.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => points += 1,
            _ => return false,
        }
    }
    digits > 0 && points <= 1
}

/// Suffix repeated names with `.1`, `.2`, ... in order of appearance
///
/// Comparison is case-insensitive so later lookups by name stay unambiguous.
pub fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut result = Vec::with_capacity(names.len());

    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 1;
        while taken.contains(&name_key(&candidate)) {
            candidate = format!("{}.{}", name, suffix);
            suffix += 1;
        }
        taken.insert(name_key(&candidate));
        result.push(candidate);
    }
    result
}
