//! Job ledger
//!
//! Uses SQLite for tracking one row per distinct input file, keyed by the
//! file's content hash. The ledger and the columnar store are separate; the
//! orchestrator keeps them consistent by ordering its writes.

pub mod types;

pub use types::{JobStart, JobStatus, LedgerStats, ProcessingJob};

use crate::error::{IngestError, Result};
use chrono::Utc;
use hackstats_common::RecordKind;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};

const JOB_COLUMNS: &str = "id, file_hash, file_name, file_type, status, row_count, error_message, \
                           created_at, completed_at, retry_path, attempts";

/// Job ledger with SQLite backend
#[derive(Debug, Clone)]
pub struct JobLedger {
    pool: SqlitePool,
}

impl JobLedger {
    /// Open (creating if needed) the ledger database and apply migrations
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!(path = %path.display(), "Opened job ledger");

        Ok(Self { pool })
    }

    /// Whether a completed job exists for this hash
    pub async fn is_completed(&self, file_hash: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM jobs WHERE file_hash = ?1 AND status = 'completed'
            "#,
        )
        .bind(file_hash)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    pub async fn completed_hashes(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT file_hash FROM jobs WHERE status = 'completed' ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("file_hash")).collect())
    }

    /// Register a file as processing
    ///
    /// A new hash gets a fresh row. A hash that already has a failed or
    /// processing row is moved back to processing with its error cleared and
    /// `attempts` incremented; the unique-constraint violation on insert is
    /// what selects that branch. A completed hash is refused.
    pub async fn start_job(
        &self,
        file_hash: &str,
        file_name: &str,
        kind: RecordKind,
        retry_path: Option<&Path>,
    ) -> Result<JobStart> {
        let retry_path = retry_path.map(|p| p.to_string_lossy().to_string());

        let inserted = sqlx::query(
            r#"
            INSERT INTO jobs (file_hash, file_name, file_type, status, created_at, retry_path, attempts)
            VALUES (?1, ?2, ?3, 'processing', ?4, ?5, 1)
            "#,
        )
        .bind(file_hash)
        .bind(file_name)
        .bind(kind.as_str())
        .bind(Utc::now())
        .bind(&retry_path)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(result) => {
                let id = result.last_insert_rowid();
                info!(job_id = id, hash = %file_hash, file = %file_name, "Registered job");
                Ok(JobStart {
                    id,
                    attempts: 1,
                    resumed: false,
                })
            },
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                self.resume_job(file_hash, file_name, kind, retry_path).await
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Re-open an unfinished job; the kind and name of the latest attempt
    /// replace the recorded ones so later retries merge where this one did
    async fn resume_job(
        &self,
        file_hash: &str,
        file_name: &str,
        kind: RecordKind,
        retry_path: Option<String>,
    ) -> Result<JobStart> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'processing',
                file_name = ?3,
                file_type = ?4,
                error_message = NULL,
                completed_at = NULL,
                attempts = attempts + 1,
                retry_path = COALESCE(?2, retry_path)
            WHERE file_hash = ?1 AND status != 'completed'
            "#,
        )
        .bind(file_hash)
        .bind(&retry_path)
        .bind(file_name)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(IngestError::AlreadyCompleted(file_hash.to_string()));
        }

        let row = sqlx::query(
            r#"
            SELECT id, attempts FROM jobs WHERE file_hash = ?1
            "#,
        )
        .bind(file_hash)
        .fetch_one(&self.pool)
        .await?;

        let start = JobStart {
            id: row.get("id"),
            attempts: row.get("attempts"),
            resumed: true,
        };
        info!(job_id = start.id, hash = %file_hash, attempts = start.attempts, "Resumed job");
        Ok(start)
    }

    /// Mark a job completed with its final row count
    ///
    /// The retry copy is no longer needed, so its path is cleared.
    pub async fn complete_job(&self, id: i64, row_count: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                row_count = ?2,
                error_message = NULL,
                completed_at = ?3,
                retry_path = NULL
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(row_count)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(job_id = id, rows = row_count, "Job completed");
        Ok(())
    }

    pub async fn fail_job(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                error_message = ?2,
                completed_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(job_id = id, error = %error, "Job failed");
        Ok(())
    }

    pub async fn job_by_id(&self, id: i64) -> Result<Option<ProcessingJob>> {
        let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(ProcessingJob::from_row).transpose()
    }

    pub async fn job_by_hash(&self, file_hash: &str) -> Result<Option<ProcessingJob>> {
        let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE file_hash = ?1", JOB_COLUMNS))
            .bind(file_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(ProcessingJob::from_row).transpose()
    }

    /// Jobs in the failed state, newest first
    pub async fn failed_jobs(&self) -> Result<Vec<ProcessingJob>> {
        self.fetch_jobs(&format!(
            "SELECT {} FROM jobs WHERE status = 'failed' ORDER BY created_at DESC, id DESC",
            JOB_COLUMNS
        ))
        .await
    }

    /// Failed jobs plus jobs left in processing by an interrupted run
    pub async fn retryable_jobs(&self) -> Result<Vec<ProcessingJob>> {
        self.fetch_jobs(&format!(
            "SELECT {} FROM jobs WHERE status IN ('failed', 'processing') ORDER BY id",
            JOB_COLUMNS
        ))
        .await
    }

    /// All jobs, newest first, optionally limited
    pub async fn history(&self, limit: Option<i64>) -> Result<Vec<ProcessingJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC, id DESC LIMIT ?1",
            JOB_COLUMNS
        ))
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ProcessingJob::from_row).collect()
    }

    /// Remove a job row; the canonical store is not touched
    pub async fn delete_job(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs WHERE id = ?1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn summary_stats(&self) -> Result<LedgerStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_jobs,
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
                COALESCE(SUM(CASE WHEN status = 'processing' THEN 1 ELSE 0 END), 0) AS processing,
                COALESCE(SUM(row_count), 0) AS total_rows
            FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(LedgerStats {
            total_jobs: row.get("total_jobs"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            processing: row.get("processing"),
            total_rows: row.get("total_rows"),
        })
    }

    async fn fetch_jobs(&self, sql: &str) -> Result<Vec<ProcessingJob>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(ProcessingJob::from_row).collect()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
