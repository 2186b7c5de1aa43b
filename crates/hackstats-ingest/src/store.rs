//! Canonical columnar store
//!
//! One Parquet file per record kind at `{data_dir}/{kind}s/data.parquet`.
//! Updates are read-merge-overwrite: the merged table is written to a
//! temporary file in the same directory and renamed over the target, so a
//! crash mid-write leaves the previous store intact. At most one writer per
//! data directory is supported.

use crate::clean::coerce_date_columns;
use crate::dedup::DEDUP_KEY_COLUMN;
use crate::error::{IngestError, Result};
use crate::table::{Column, ColumnKind, Table, Value};
use arrow::array::{Array, ArrayRef, Float64Array, StringArray, TimestampMicrosecondArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use hackstats_common::RecordKind;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const STORE_FILE_NAME: &str = "data.parquet";

/// What downstream readers see of one kind's store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub exists: bool,
    pub row_count: usize,
    pub columns: Vec<String>,
}

/// Row accounting for one merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Rows in the incoming batch
    pub batch_rows: usize,
    /// Rows from the batch that survived deduplication
    pub appended: usize,
    /// Rows in the store after the write
    pub total_rows: usize,
}

#[derive(Debug, Clone)]
pub struct ColumnarStore {
    data_dir: PathBuf,
}

impl ColumnarStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn path(&self, kind: RecordKind) -> PathBuf {
        self.data_dir.join(kind.dir_name()).join(STORE_FILE_NAME)
    }

    /// Full scan of a kind's store; `None` when nothing has been written yet
    pub fn read(&self, kind: RecordKind) -> Result<Option<Table>> {
        let path = self.path(kind);
        if !path.exists() {
            return Ok(None);
        }
        read_table(&path).map(Some)
    }

    pub fn summary(&self, kind: RecordKind) -> Result<StoreSummary> {
        Ok(match self.read(kind)? {
            Some(table) => StoreSummary {
                exists: true,
                row_count: table.row_count(),
                columns: table.column_names(),
            },
            None => StoreSummary::default(),
        })
    }

    /// Merge a keyed batch into the store, first occurrence of a key winning
    ///
    /// Existing rows keep their order and come first; surviving batch rows
    /// follow in batch order. Columns are unioned.
    pub fn merge_and_write(&self, batch: Table, kind: RecordKind) -> Result<MergeStats> {
        if batch.position(DEDUP_KEY_COLUMN).is_none() {
            return Err(IngestError::store(format!(
                "batch has no {} column",
                DEDUP_KEY_COLUMN
            )));
        }

        let path = self.path(kind);
        let batch_rows = batch.row_count();

        let (combined, existing_rows) = match self.read(kind)? {
            Some(mut existing) => {
                let existing_rows = existing.row_count();
                let mut batch = batch;
                coerce_date_columns(&mut existing, kind);
                coerce_date_columns(&mut batch, kind);
                (Table::concat(existing, batch), existing_rows)
            },
            None => (batch, 0),
        };

        let merged = drop_duplicate_keys(&combined)?;
        let stats = MergeStats {
            batch_rows,
            appended: merged.row_count().saturating_sub(existing_rows),
            total_rows: merged.row_count(),
        };

        write_table(&path, &merged)?;
        info!(
            kind = %kind,
            batch_rows = stats.batch_rows,
            appended = stats.appended,
            total_rows = stats.total_rows,
            "Merged batch into store"
        );
        Ok(stats)
    }
}

/// Keep the first row for each dedup key
fn drop_duplicate_keys(table: &Table) -> Result<Table> {
    let keys = table
        .column(DEDUP_KEY_COLUMN)
        .ok_or_else(|| IngestError::store(format!("missing {} column", DEDUP_KEY_COLUMN)))?;

    let mut seen = HashSet::with_capacity(keys.values.len());
    let keep: Vec<usize> = keys
        .values
        .iter()
        .enumerate()
        .filter(|(_, key)| seen.insert(key.render()))
        .map(|(idx, _)| idx)
        .collect();

    if keep.len() < table.row_count() {
        debug!(dropped = table.row_count() - keep.len(), "Dropped duplicate keys");
    }
    Ok(table.select_rows(&keep))
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_created_by(format!("hackstats {}", env!("CARGO_PKG_VERSION")))
        .build()
}

fn arrow_column(column: &Column) -> (Field, ArrayRef) {
    match column.kind() {
        ColumnKind::Number => {
            let values: Vec<Option<f64>> = column
                .values
                .iter()
                .map(|v| match v {
                    Value::Number(n) => Some(*n),
                    _ => None,
                })
                .collect();
            (
                Field::new(&column.name, DataType::Float64, true),
                Arc::new(Float64Array::from(values)),
            )
        },
        ColumnKind::Timestamp => {
            let values: Vec<Option<i64>> = column
                .values
                .iter()
                .map(|v| match v {
                    Value::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
                    _ => None,
                })
                .collect();
            (
                Field::new(
                    &column.name,
                    DataType::Timestamp(TimeUnit::Microsecond, None),
                    true,
                ),
                Arc::new(TimestampMicrosecondArray::from(values)),
            )
        },
        ColumnKind::Text | ColumnKind::Empty => {
            let values: Vec<Option<String>> = column
                .values
                .iter()
                .map(|v| if v.is_null() { None } else { Some(v.render()) })
                .collect();
            (
                Field::new(&column.name, DataType::Utf8, true),
                Arc::new(StringArray::from(values)),
            )
        },
    }
}

/// Write a table to `path` through a temporary file and an atomic rename
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    if table.column_count() == 0 {
        return Err(IngestError::store("cannot write a table with no columns"));
    }
    let dir = path
        .parent()
        .ok_or_else(|| IngestError::store(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) = table.columns().iter().map(arrow_column).unzip();
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    let mut writer = ArrowWriter::try_new(tmp.as_file_mut(), schema, Some(writer_properties()))?;
    writer.write(&batch)?;
    writer.close()?;
    tmp.as_file().sync_all()?;

    tmp.persist(path).map_err(|e| IngestError::Io(e.error))?;
    debug!(path = %path.display(), rows = table.row_count(), "Wrote store file");
    Ok(())
}

/// Read a Parquet file into a table
///
/// Float and integer columns become numbers, timestamp and date columns
/// become UTC-naive timestamps, and anything else is cast to text.
pub fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let mut columns: Vec<Column> = schema
        .fields()
        .iter()
        .map(|field| Column::new(field.name().clone(), Vec::new()))
        .collect();

    for batch in reader {
        let batch = batch?;
        for (idx, column) in columns.iter_mut().enumerate() {
            let array = batch.column(idx);
            column.values.extend(array_values(array)?);
        }
    }

    Table::from_columns(columns)
}

fn array_values(array: &ArrayRef) -> Result<Vec<Value>> {
    match array.data_type() {
        DataType::Timestamp(_, tz) => {
            let target = DataType::Timestamp(TimeUnit::Microsecond, tz.clone());
            timestamp_values(&cast(array, &target)?)
        },
        DataType::Date32 | DataType::Date64 => {
            let target = DataType::Timestamp(TimeUnit::Microsecond, None);
            timestamp_values(&cast(array, &target)?)
        },
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let floats = cast(array, &DataType::Float64)?;
            let floats = floats
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| IngestError::store("expected a float column"))?;
            Ok((0..floats.len())
                .map(|i| {
                    if floats.is_null(i) {
                        Value::Null
                    } else {
                        Value::Number(floats.value(i))
                    }
                })
                .collect())
        },
        _ => {
            let strings = cast(array, &DataType::Utf8)?;
            let strings = strings
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| IngestError::store("expected a string column"))?;
            Ok((0..strings.len())
                .map(|i| {
                    if strings.is_null(i) {
                        Value::Null
                    } else {
                        Value::Text(strings.value(i).to_string())
                    }
                })
                .collect())
        },
    }
}

/// Timestamp values are UTC instants; the offset is dropped
fn timestamp_values(array: &ArrayRef) -> Result<Vec<Value>> {
    let micros = array
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .ok_or_else(|| IngestError::store("expected a timestamp column"))?;
    Ok((0..micros.len())
        .map(|i| {
            if micros.is_null(i) {
                return Value::Null;
            }
            DateTime::from_timestamp_micros(micros.value(i))
                .map(|ts| Value::Timestamp(ts.naive_utc()))
                .unwrap_or(Value::Null)
        })
        .collect())
}
