//! Error types for the ingest pipeline
//!
//! Every variant ends up as a per-file error string in a batch summary or as
//! a ledger `error_message`; nothing here is process-fatal.

use hackstats_common::HackstatsError;
use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Common(#[from] HackstatsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The loader could not produce a table from the file
    #[error("Unreadable file: {0}")]
    Unreadable(String),

    #[error("Empty or unreadable file")]
    EmptyTable,

    #[error("Unknown file type. Columns found: {}", columns.join(", "))]
    UnknownType { columns: Vec<String> },

    #[error("Ledger error: {0}")]
    Ledger(#[from] sqlx::Error),

    #[error("Ledger migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Job for file hash {0} is already completed")]
    AlreadyCompleted(String),

    #[error("Invalid job status in ledger: {0}")]
    InvalidStatus(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn unreadable(msg: impl Into<String>) -> Self {
        Self::Unreadable(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
