//! Job ledger records

use crate::error::{IngestError, Result};
use chrono::{DateTime, Utc};
use hackstats_common::RecordKind;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::PathBuf;

/// Processing state of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether an explicit retry may pick this job up
    pub fn is_retryable(&self) -> bool {
        match self {
            JobStatus::Processing | JobStatus::Failed => true,
            JobStatus::Completed => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(IngestError::InvalidStatus(other.to_string())),
        }
    }
}

/// One row of the `jobs` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingJob {
    pub id: i64,
    pub file_hash: String,
    pub file_name: String,
    pub file_type: RecordKind,
    pub status: JobStatus,
    pub row_count: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_path: Option<PathBuf>,
    pub attempts: i64,
}

impl ProcessingJob {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let file_type: String = row.try_get("file_type")?;
        let status: String = row.try_get("status")?;
        let retry_path: Option<String> = row.try_get("retry_path")?;

        Ok(Self {
            id: row.try_get("id")?,
            file_hash: row.try_get("file_hash")?,
            file_name: row.try_get("file_name")?,
            file_type: file_type.parse()?,
            status: status.parse()?,
            row_count: row.try_get("row_count")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
            retry_path: retry_path.map(PathBuf::from),
            attempts: row.try_get("attempts")?,
        })
    }
}

/// Result of registering a file with the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStart {
    pub id: i64,
    pub attempts: i64,
    /// An existing failed or stale row was moved back to processing
    pub resumed: bool,
}

/// Aggregate counts over the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub total_jobs: i64,
    pub completed: i64,
    pub failed: i64,
    pub processing: i64,
    pub total_rows: i64,
}
