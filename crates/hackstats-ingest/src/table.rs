//! Schema-less tabular container
//!
//! Source exports define their own columns, so a batch is an ordered list of
//! named columns of [`Value`]s rather than a fixed record type. Everything
//! downstream looks columns up by name and checks for presence explicitly.

use crate::error::{IngestError, Result};
use chrono::NaiveDateTime;
use hackstats_common::text::clean_string;

/// Format used when a timestamp has to be rendered as text
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Number(f64),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or whitespace-only text
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(n) => n.is_nan(),
            Value::Timestamp(_) => false,
        }
    }

    /// Render the cell as text; null renders as the empty string and
    /// integral numbers drop their fractional part
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Storage type inferred from a column's non-null values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Every value is null
    Empty,
    /// At least one text value, or a mix of types
    Text,
    Number,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn kind(&self) -> ColumnKind {
        let mut kind = ColumnKind::Empty;
        for value in &self.values {
            let this = match value {
                Value::Null => continue,
                Value::Text(_) => return ColumnKind::Text,
                Value::Number(_) => ColumnKind::Number,
                Value::Timestamp(_) => ColumnKind::Timestamp,
            };
            if kind == ColumnKind::Empty {
                kind = this;
            } else if kind != this {
                return ColumnKind::Text;
            }
        }
        kind
    }
}

/// Lookup key for a column name: whitespace-collapsed and lower-cased
pub fn name_key(name: &str) -> String {
    clean_string(name).to_lowercase()
}

/// Ordered, named columns of equal length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from columns, which must all have the same length
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map(|c| c.values.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.values.len() != row_count) {
            return Err(IngestError::store(format!(
                "column '{}' has {} values, expected {}",
                bad.name,
                bad.values.len(),
                row_count
            )));
        }
        Ok(Self { columns, row_count })
    }

    /// Build a table from a header row and data rows, padding short rows
    /// with nulls
    pub fn from_rows(header: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let width = header.len();
        let mut columns: Vec<Column> = header
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();

        for (index, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(IngestError::unreadable(format!(
                    "row {} has {} fields but the header has {}",
                    index + 1,
                    row.len(),
                    width
                )));
            }
            row.resize(width, Value::Null);
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }

        Self::from_columns(columns)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// No rows or no columns
    pub fn is_empty(&self) -> bool {
        self.row_count == 0 || self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Position of a column by exact name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Position of a column by case-insensitive, whitespace-normalized name
    pub fn find(&self, name: &str) -> Option<usize> {
        let key = name_key(name);
        self.columns.iter().position(|c| name_key(&c.name) == key)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.find(name).map(|idx| &self.columns[idx])
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.find(name).map(move |idx| &mut self.columns[idx])
    }

    /// Append a column, or replace the values of an existing one with the
    /// same exact name
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if !self.columns.is_empty() && values.len() != self.row_count {
            return Err(IngestError::store(format!(
                "column '{}' has {} values, expected {}",
                name,
                values.len(),
                self.row_count
            )));
        }
        if self.columns.is_empty() {
            self.row_count = values.len();
        }

        match self.position(name) {
            Some(idx) => self.columns[idx].values = values,
            None => self.columns.push(Column::new(name, values)),
        }
        Ok(())
    }

    pub fn remove_column(&mut self, idx: usize) -> Column {
        self.columns.remove(idx)
    }

    /// Drop a column located with [`Table::find`]; returns whether one existed
    pub fn drop_column(&mut self, name: &str) -> bool {
        match self.find(name) {
            Some(idx) => {
                self.columns.remove(idx);
                true
            },
            None => false,
        }
    }

    /// Copy of the table without the named column
    pub fn without_column(&self, name: &str) -> Table {
        let mut table = self.clone();
        table.drop_column(name);
        table
    }

    /// Keep only the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                Column::new(
                    column.name.clone(),
                    indices.iter().map(|&i| column.values[i].clone()).collect(),
                )
            })
            .collect();
        Table {
            columns,
            row_count: indices.len(),
        }
    }

    /// Cells of one row, in column order
    pub fn row(&self, index: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[index]).collect()
    }

    /// Rename every column, keeping values in place
    pub fn rename_columns(&mut self, names: Vec<String>) -> Result<()> {
        if names.len() != self.columns.len() {
            return Err(IngestError::store(format!(
                "expected {} column names, got {}",
                self.columns.len(),
                names.len()
            )));
        }
        for (column, name) in self.columns.iter_mut().zip(names) {
            column.name = name;
        }
        Ok(())
    }

    /// Drop the first data row
    pub fn skip_first_row(&mut self) {
        if self.row_count == 0 {
            return;
        }
        for column in &mut self.columns {
            column.values.remove(0);
        }
        self.row_count -= 1;
    }

    /// Stack `bottom` beneath `top`
    ///
    /// The result has `top`'s columns in order followed by columns only
    /// `bottom` has; cells a side lacks are null.
    pub fn concat(top: Table, bottom: Table) -> Table {
        let top_rows = top.row_count;
        let bottom_rows = bottom.row_count;
        let mut bottom_columns: Vec<Option<Column>> = bottom.columns.into_iter().map(Some).collect();

        let mut columns: Vec<Column> = Vec::with_capacity(top.columns.len());
        for mut column in top.columns {
            let matching = bottom_columns
                .iter()
                .position(|c| c.as_ref().map(|c| c.name == column.name).unwrap_or(false));
            match matching.and_then(|idx| bottom_columns[idx].take()) {
                Some(other) => column.values.extend(other.values),
                None => column.values.resize(top_rows + bottom_rows, Value::Null),
            }
            columns.push(column);
        }

        for column in bottom_columns.into_iter().flatten() {
            let mut values = vec![Value::Null; top_rows];
            values.extend(column.values);
            columns.push(Column::new(column.name, values));
        }

        Table {
            columns,
            row_count: top_rows + bottom_rows,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::text(s)
    }

    #[test]
    fn test_from_rows_pads_short_rows() {
        let table = Table::from_rows(
            vec!["A".into(), "B".into()],
            vec![vec![text("1"), text("2")], vec![text("3")]],
        )
        .unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("B").unwrap().values[1], Value::Null);
    }

    #[test]
    fn test_from_rows_rejects_wide_rows() {
        let result = Table::from_rows(vec!["A".into()], vec![vec![text("1"), text("2")]]);
        assert!(matches!(result, Err(IngestError::Unreadable(_))));
    }

    #[test]
    fn test_find_is_case_and_space_insensitive() {
        let table = Table::from_rows(vec!["Submission  Url".into()], vec![vec![text("x")]]).unwrap();
        assert_eq!(table.find("submission url"), Some(0));
        assert!(table.find("project title").is_none());
    }

    #[test]
    fn test_column_kind_inference() {
        assert_eq!(Column::new("a", vec![Value::Null]).kind(), ColumnKind::Empty);
        assert_eq!(
            Column::new("a", vec![Value::Number(1.0), Value::Null]).kind(),
            ColumnKind::Number
        );
        assert_eq!(
            Column::new("a", vec![Value::Number(1.0), text("x")]).kind(),
            ColumnKind::Text
        );
    }

    #[test]
    fn test_render_numbers() {
        assert_eq!(Value::Number(12345.0).render(), "12345");
        assert_eq!(Value::Number(2.5).render(), "2.5");
        assert_eq!(Value::Null.render(), "");
    }

    #[test]
    fn test_concat_unions_columns() {
        let top = Table::from_rows(vec!["A".into(), "B".into()], vec![vec![text("a1"), text("b1")]]).unwrap();
        let bottom = Table::from_rows(vec!["B".into(), "C".into()], vec![vec![text("b2"), text("c2")]]).unwrap();

        let merged = Table::concat(top, bottom);
        assert_eq!(merged.column_names(), vec!["A", "B", "C"]);
        assert_eq!(merged.row_count(), 2);
        assert_eq!(merged.column("A").unwrap().values, vec![text("a1"), Value::Null]);
        assert_eq!(merged.column("B").unwrap().values, vec![text("b1"), text("b2")]);
        assert_eq!(merged.column("C").unwrap().values, vec![Value::Null, text("c2")]);
    }

    #[test]
    fn test_select_rows_keeps_order() {
        let table = Table::from_rows(
            vec!["A".into()],
            vec![vec![text("0")], vec![text("1")], vec![text("2")]],
        )
        .unwrap();
        let picked = table.select_rows(&[2, 0]);
        assert_eq!(picked.column("A").unwrap().values, vec![text("2"), text("0")]);
    }
}
