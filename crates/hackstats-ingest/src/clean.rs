//! Per-kind cleaning and type coercion
//!
//! Runs after classification. Suffixed duplicates of any column are first
//! coalesced back into their base column, text columns get whitespace
//! cleaning, and the known date/count columns are then coerced. Bad values
//! become null; rows are never dropped here.

use crate::error::Result;
use crate::table::{name_key, Column, ColumnKind, Table, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use hackstats_common::text::clean_string;
use hackstats_common::RecordKind;
use tracing::debug;

/// Date-bearing submission columns
pub const SUBMISSION_DATE_COLUMNS: &[&str] =
    &["Project Created At", "Challenge Published At", "Created At"];

/// Team-size-like submission columns
pub const TEAM_SIZE_COLUMNS: &[&str] = &["Additional Team Member Count", "Team Size"];

pub const WORK_EXPERIENCE_COLUMN: &str = "Work Experience";

/// Free-text registrant column nothing downstream reads
pub const INTERESTS_COLUMN: &str = "Interests";

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%b-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// Render any cell as cleaned text; null becomes the empty string
pub fn clean_value(value: &Value) -> String {
    match value {
        Value::Text(s) => clean_string(s),
        other => other.render(),
    }
}

/// Parse a timestamp in any of the formats seen in exports
///
/// Values carrying an offset are converted to UTC and the offset dropped.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_utc());
    }
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(text, format) {
            return Some(ts.naive_utc());
        }
    }

    // a trailing UTC marker carries no offset to apply
    let text = text
        .strip_suffix(" UTC")
        .or_else(|| text.strip_suffix('Z'))
        .unwrap_or(text)
        .trim_end();

    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Coerce a cell to a timestamp, or null
pub fn to_timestamp(value: &Value) -> Value {
    match value {
        Value::Timestamp(ts) => Value::Timestamp(*ts),
        Value::Text(s) => parse_timestamp(s).map(Value::Timestamp).unwrap_or(Value::Null),
        Value::Null | Value::Number(_) => Value::Null,
    }
}

/// Coerce a cell to a number, or null
pub fn to_number(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_finite() => Value::Number(*n),
        Value::Text(s) => parse_number(s).map(Value::Number).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Fold suffixed duplicates (`name.1`, `name.2`, ...) into the base column
///
/// For each row the first non-blank value, scanning left to right, wins.
/// Returns the number of variant columns removed.
pub fn coalesce_variants(table: &mut Table, base: &str) -> usize {
    let Some(base_idx) = table.find(base) else {
        return 0;
    };
    let base_key = name_key(&table.columns()[base_idx].name);

    let variant_positions: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, column)| is_variant_of(&name_key(&column.name), &base_key))
        .map(|(idx, _)| idx)
        .collect();
    if variant_positions.is_empty() {
        return 0;
    }

    let mut sources = vec![base_idx];
    sources.extend(variant_positions.iter().copied());
    sources.sort_unstable();

    let merged: Vec<Value> = (0..table.row_count())
        .map(|row| {
            sources
                .iter()
                .map(|&idx| &table.columns()[idx].values[row])
                .find(|value| !value.is_blank())
                .cloned()
                .unwrap_or(Value::Null)
        })
        .collect();

    table.columns_mut()[base_idx].values = merged;
    for idx in variant_positions.iter().rev() {
        table.remove_column(*idx);
    }

    debug!(column = %base, removed = variant_positions.len(), "Coalesced duplicate columns");
    variant_positions.len()
}

/// Coalesce the suffixed variants of every column that has them
///
/// Returns the number of variant columns removed.
pub fn coalesce_all_variants(table: &mut Table) -> usize {
    let keys: Vec<String> = table.columns().iter().map(|c| name_key(&c.name)).collect();

    let mut bases: Vec<String> = Vec::new();
    for (idx, key) in keys.iter().enumerate() {
        let has_variant = keys.iter().any(|other| is_variant_of(other, key));
        // a variant whose base is itself present is folded under that base
        let is_variant = keys.iter().any(|other| is_variant_of(key, other));
        if has_variant && !is_variant {
            bases.push(table.columns()[idx].name.clone());
        }
    }

    bases
        .iter()
        .map(|base| coalesce_variants(table, base))
        .sum()
}

fn is_variant_of(key: &str, base_key: &str) -> bool {
    key.strip_prefix(base_key)
        .and_then(|rest| rest.strip_prefix('.'))
        .map(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

fn map_column(table: &mut Table, name: &str, f: impl Fn(&Value) -> Value) -> bool {
    match table.column_mut(name) {
        Some(column) => {
            column.values = column.values.iter().map(f).collect();
            true
        },
        None => false,
    }
}

/// Re-coerce every known date column of a table in place
///
/// Also used by the store on both sides of a merge so timestamps read back
/// from disk line up with freshly cleaned ones.
pub fn coerce_date_columns(table: &mut Table, kind: RecordKind) {
    if kind != RecordKind::Submission {
        return;
    }
    for name in SUBMISSION_DATE_COLUMNS {
        map_column(table, name, to_timestamp);
    }
}

/// Applies the per-kind cleaning rules
#[derive(Debug, Clone)]
pub struct Cleaner {
    max_work_experience: f64,
}

impl Cleaner {
    pub fn new(max_work_experience: f64) -> Self {
        Self {
            max_work_experience,
        }
    }

    pub fn clean(&self, mut table: Table, kind: RecordKind) -> Result<Table> {
        let merged = coalesce_all_variants(&mut table);
        if merged > 0 {
            debug!(merged, "Merged duplicate columns");
        }
        clean_text_columns(table.columns_mut());

        match kind {
            RecordKind::Submission => self.clean_submissions(&mut table),
            RecordKind::Registrant => self.clean_registrants(&mut table),
        }

        Ok(table)
    }

    fn clean_submissions(&self, table: &mut Table) {
        coerce_date_columns(table, RecordKind::Submission);

        for name in TEAM_SIZE_COLUMNS {
            map_column(table, name, to_number);
        }
    }

    fn clean_registrants(&self, table: &mut Table) {
        let ceiling = self.max_work_experience;
        map_column(table, WORK_EXPERIENCE_COLUMN, |value| match to_number(value) {
            Value::Number(years) if years > ceiling => Value::Null,
            other => other,
        });
        let missing = table
            .column(WORK_EXPERIENCE_COLUMN)
            .map(|column| column.values.iter().filter(|v| v.is_null()).count())
            .unwrap_or(0);
        debug!(missing, ceiling, "Coerced work experience");

        if table.drop_column(INTERESTS_COLUMN) {
            debug!("Dropped interests column");
        }
    }
}

/// Whitespace-clean every free-text column; nulls become empty strings
fn clean_text_columns(columns: &mut [Column]) {
    for column in columns.iter_mut() {
        if column.kind() != ColumnKind::Text {
            continue;
        }
        for value in column.values.iter_mut() {
            *value = Value::Text(clean_value(value));
        }
    }
}
