//! Ingestion orchestrator
//!
//! Drives one file through validate → hash → load → normalize → classify →
//! register → clean → key → merge, and runs that sequence over folders, zip
//! archives and retry selections. Every failure resolves to a per-file
//! outcome; nothing here aborts a batch.
//!
//! Ordering between the two stores: the ledger row is written only after
//! the file's kind is known, the store is merged before the row is marked
//! completed, and the retry copy is removed only after that.

use crate::archive::{collect_candidates, extract_zip};
use crate::classify::{classify, Classification};
use crate::clean::Cleaner;
use crate::config::IngestConfig;
use crate::dedup::derive_key;
use crate::error::{IngestError, Result};
use crate::ledger::{JobLedger, JobStart, ProcessingJob};
use crate::loader;
use crate::schema::normalize_headers;
use crate::store::{ColumnarStore, StoreSummary};
use crate::table::Table;
use hackstats_common::checksum::compute_file_hash;
use hackstats_common::validate::{validate_file, SUPPORTED_EXTENSIONS};
use hackstats_common::RecordKind;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Reason reported for a file whose bytes were already ingested
pub const ALREADY_PROCESSED: &str = "Already processed";

/// Diagnostic for a retry whose retained copy is gone
pub const REUPLOAD_REQUIRED: &str = "Retry copy missing; re-upload required";

/// Result of one file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileOutcome {
    Processed { kind: RecordKind, rows: usize },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
}

/// Aggregate result of a folder, archive or retry run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total_files: usize,
    pub processed_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
    pub errors: Vec<FileError>,
}

impl BatchSummary {
    fn record(&mut self, file: &str, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Processed { .. } => self.processed_files += 1,
            FileOutcome::Skipped { .. } => self.skipped_files += 1,
            FileOutcome::Failed { error } => {
                self.failed_files += 1;
                self.errors.push(FileError {
                    file: file.to_string(),
                    error: error.clone(),
                });
            },
        }
    }

    fn single_error(file: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            errors: vec![FileError {
                file: file.into(),
                error: error.into(),
            }],
            ..Self::default()
        }
    }
}

/// Which jobs a retry run replays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrySelection {
    /// Every failed job plus any left in processing by an interrupted run
    All,
    Hashes(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnretryableJob {
    pub hash: String,
    pub file_name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetrySummary {
    #[serde(flatten)]
    pub summary: BatchSummary,
    pub unretryable: Vec<UnretryableJob>,
}

/// Store summaries for both record kinds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataSummary {
    pub submissions: StoreSummary,
    pub registrants: StoreSummary,
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub struct Ingestor {
    config: IngestConfig,
    ledger: JobLedger,
    store: ColumnarStore,
    cleaner: Cleaner,
}

impl Ingestor {
    /// Create the working directories and open the ledger
    pub async fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;

        for kind in RecordKind::ALL {
            std::fs::create_dir_all(config.store_dir(kind))?;
            std::fs::create_dir_all(config.retry_dir_for(kind))?;
        }
        std::fs::create_dir_all(&config.temp_dir)?;

        let ledger = JobLedger::open(&config.database_path).await?;
        let store = ColumnarStore::new(&config.data_dir);
        let cleaner = Cleaner::new(config.max_work_experience);

        Ok(Self {
            config,
            ledger,
            store,
            cleaner,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    pub fn store(&self) -> &ColumnarStore {
        &self.store
    }

    /// Ingest a single file
    pub async fn process_file(&self, path: &Path) -> FileOutcome {
        match self.try_process_file(path).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "File failed");
                FileOutcome::Failed {
                    error: e.to_string(),
                }
            },
        }
    }

    #[instrument(skip(self), fields(file = %path.display()))]
    async fn try_process_file(&self, path: &Path) -> Result<FileOutcome> {
        validate_file(path, SUPPORTED_EXTENSIONS)?;

        let hash = compute_file_hash(path)?;
        if self.ledger.is_completed(&hash).await? {
            info!(hash = %hash, "Skipping already processed file");
            return Ok(FileOutcome::Skipped {
                reason: ALREADY_PROCESSED.to_string(),
            });
        }

        // nothing below writes to the ledger until the kind is known
        let table = loader::load(path)?;
        if table.is_empty() {
            return Err(IngestError::EmptyTable);
        }
        let table = normalize_headers(table)?;

        let file_name = display_name(path);
        let kind = match classify(&table, &file_name) {
            Classification::Known(kind) => kind,
            Classification::Unknown => {
                return Err(IngestError::UnknownType {
                    columns: table.column_names(),
                })
            },
        };

        let Some((start, retry_copy)) = self.register(path, &hash, &file_name, kind).await? else {
            return Ok(FileOutcome::Skipped {
                reason: ALREADY_PROCESSED.to_string(),
            });
        };

        let merged = self.clean_and_merge(table, kind, &hash);
        self.settle(start.id, kind, &retry_copy, merged).await
    }

    /// Retain a retry copy and open the ledger row
    ///
    /// Returns `None` when another run completed the hash after the
    /// completion check; a copy made for this attempt is removed again.
    async fn register(
        &self,
        path: &Path,
        hash: &str,
        file_name: &str,
        kind: RecordKind,
    ) -> Result<Option<(JobStart, PathBuf)>> {
        // a re-submitted failed hash keeps the copy from its first attempt
        let earlier_copy = self
            .ledger
            .job_by_hash(hash)
            .await?
            .and_then(|job| job.retry_path)
            .filter(|copy| copy.is_file());
        let (retry_copy, retained) = match earlier_copy {
            Some(copy) => (copy, false),
            None => (self.retain_copy(path, kind, hash, file_name)?, true),
        };

        match self
            .ledger
            .start_job(hash, file_name, kind, Some(&retry_copy))
            .await
        {
            Ok(start) => Ok(Some((start, retry_copy))),
            Err(IngestError::AlreadyCompleted(_)) => {
                if retained {
                    self.discard_copy(&retry_copy);
                }
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    /// Path of the retained copy for a registered file
    pub fn retry_copy_path(&self, kind: RecordKind, hash: &str, file_name: &str) -> PathBuf {
        self.config
            .retry_dir_for(kind)
            .join(format!("{}_{}", hash, file_name))
    }

    /// Keep the original bytes for replay; an existing copy is reused
    fn retain_copy(&self, path: &Path, kind: RecordKind, hash: &str, file_name: &str) -> Result<PathBuf> {
        let target = self.retry_copy_path(kind, hash, file_name);
        if !target.exists() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(path, &target)?;
        }
        Ok(target)
    }

    fn discard_copy(&self, retry_copy: &Path) {
        if let Err(e) = std::fs::remove_file(retry_copy) {
            warn!(path = %retry_copy.display(), error = %e, "Could not remove retry copy");
        }
    }

    /// Clean, key and merge a registered batch; returns the batch row count
    fn clean_and_merge(&self, table: Table, kind: RecordKind, hash: &str) -> Result<usize> {
        let cleaned = self.cleaner.clean(table, kind)?;
        let keyed = derive_key(cleaned, kind, hash)?;
        let rows = keyed.row_count();
        self.store.merge_and_write(keyed, kind)?;
        Ok(rows)
    }

    /// Record the result of the post-registration stage in the ledger
    async fn settle(
        &self,
        job_id: i64,
        kind: RecordKind,
        retry_copy: &Path,
        merged: Result<usize>,
    ) -> Result<FileOutcome> {
        match merged {
            Ok(rows) => {
                self.ledger.complete_job(job_id, rows as i64).await?;
                self.discard_copy(retry_copy);
                info!(job_id, kind = %kind, rows, "File processed");
                Ok(FileOutcome::Processed { kind, rows })
            },
            Err(e) => {
                let error = e.to_string();
                self.ledger.fail_job(job_id, &error).await?;
                warn!(job_id, error = %error, "Job failed, retry copy kept");
                Ok(FileOutcome::Failed { error })
            },
        }
    }

    /// Ingest every candidate file directly inside a folder
    pub async fn process_folder(
        &self,
        dir: &Path,
        progress: impl FnMut(usize, usize, &str),
    ) -> BatchSummary {
        if !dir.is_dir() {
            return BatchSummary::single_error(dir.display().to_string(), "Folder does not exist");
        }

        match collect_candidates(dir, false) {
            Ok(files) => self.process_paths(&files, progress).await,
            Err(e) => BatchSummary::single_error(dir.display().to_string(), e.to_string()),
        }
    }

    /// Extract a zip archive into scratch space and ingest every candidate
    ///
    /// The extraction directory is removed when this returns, whatever the
    /// outcome.
    pub async fn process_zip(
        &self,
        archive: &Path,
        progress: impl FnMut(usize, usize, &str),
    ) -> BatchSummary {
        let name = display_name(archive);

        let scratch = match tempfile::Builder::new()
            .prefix("extract-")
            .tempdir_in(&self.config.temp_dir)
        {
            Ok(dir) => dir,
            Err(e) => return BatchSummary::single_error(name, e.to_string()),
        };

        let files = extract_zip(archive, scratch.path())
            .and_then(|_| collect_candidates(scratch.path(), true));
        match files {
            Ok(files) => self.process_paths(&files, progress).await,
            Err(e) => BatchSummary::single_error(name, e.to_string()),
        }
    }

    async fn process_paths(
        &self,
        files: &[PathBuf],
        mut progress: impl FnMut(usize, usize, &str),
    ) -> BatchSummary {
        let mut summary = BatchSummary {
            total_files: files.len(),
            ..BatchSummary::default()
        };

        for (idx, path) in files.iter().enumerate() {
            let name = display_name(path);
            progress(idx + 1, files.len(), &name);
            let outcome = self.process_file(path).await;
            summary.record(&name, &outcome);
        }

        info!(
            total = summary.total_files,
            processed = summary.processed_files,
            skipped = summary.skipped_files,
            failed = summary.failed_files,
            "Batch finished"
        );
        summary
    }

    /// Replay registered-but-unfinished jobs from their retry copies
    ///
    /// Replay starts at cleaning: the stored kind is trusted and the file is
    /// not re-classified. Jobs whose copy is gone are reported, not skipped.
    pub async fn retry(&self, selection: RetrySelection) -> Result<RetrySummary> {
        let mut result = RetrySummary::default();

        let jobs: Vec<ProcessingJob> = match selection {
            RetrySelection::All => self.ledger.retryable_jobs().await?,
            RetrySelection::Hashes(hashes) => {
                let mut jobs = Vec::with_capacity(hashes.len());
                for hash in hashes {
                    match self.ledger.job_by_hash(&hash).await? {
                        Some(job) => jobs.push(job),
                        None => result.unretryable.push(UnretryableJob {
                            hash,
                            file_name: None,
                            reason: "No job recorded for this hash".to_string(),
                        }),
                    }
                }
                jobs
            },
        };

        for job in jobs {
            if !job.status.is_retryable() {
                result.summary.total_files += 1;
                result.summary.record(
                    &job.file_name,
                    &FileOutcome::Skipped {
                        reason: ALREADY_PROCESSED.to_string(),
                    },
                );
                continue;
            }

            let copy = match job.retry_path.clone().filter(|p| p.is_file()) {
                Some(copy) => copy,
                None => {
                    warn!(hash = %job.file_hash, file = %job.file_name, "Retry copy missing");
                    result.unretryable.push(UnretryableJob {
                        hash: job.file_hash.clone(),
                        file_name: Some(job.file_name.clone()),
                        reason: REUPLOAD_REQUIRED.to_string(),
                    });
                    continue;
                },
            };

            result.summary.total_files += 1;
            let outcome = match self.replay(&job, &copy).await {
                Ok(outcome) => outcome,
                Err(e) => FileOutcome::Failed {
                    error: e.to_string(),
                },
            };
            result.summary.record(&job.file_name, &outcome);
        }

        Ok(result)
    }

    #[instrument(skip(self, job), fields(hash = %job.file_hash, file = %job.file_name))]
    async fn replay(&self, job: &ProcessingJob, copy: &Path) -> Result<FileOutcome> {
        let kind = job.file_type;
        let start = self
            .ledger
            .start_job(&job.file_hash, &job.file_name, kind, None)
            .await?;

        let merged = loader::load(copy)
            .and_then(normalize_headers)
            .and_then(|table| self.clean_and_merge(table, kind, &job.file_hash));
        self.settle(start.id, kind, copy, merged).await
    }

    pub async fn data_summary(&self) -> Result<DataSummary> {
        Ok(DataSummary {
            submissions: self.store.summary(RecordKind::Submission)?,
            registrants: self.store.summary(RecordKind::Registrant)?,
        })
    }

    /// Delete a job row and its retry copy; the store is left as is
    pub async fn delete_job(&self, id: i64) -> Result<bool> {
        let Some(job) = self.ledger.job_by_id(id).await? else {
            return Ok(false);
        };

        if let Some(copy) = job.retry_path.as_deref().filter(|p| p.exists()) {
            std::fs::remove_file(copy)?;
        }
        self.ledger.delete_job(id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_ingestor() -> (Ingestor, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = IngestConfig::rooted_at(temp_dir.path());
        let ingestor = Ingestor::new(config).await.unwrap();
        (ingestor, temp_dir)
    }

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_new_creates_directories() {
        let (ingestor, temp) = create_test_ingestor().await;
        assert!(temp.path().join("data").join("submissions").is_dir());
        assert!(temp.path().join("data").join("retry").join("registrants").is_dir());
        assert!(temp.path().join("temp").is_dir());
        assert_eq!(ingestor.data_summary().await.unwrap(), DataSummary::default());
    }

    #[tokio::test]
    async fn test_unsupported_extension_fails_without_ledger_row() {
        let (ingestor, temp) = create_test_ingestor().await;
        let path = write(temp.path(), "notes.txt", "hello");

        let outcome = ingestor.process_file(&path).await;
        assert!(matches!(outcome, FileOutcome::Failed { .. }));
        assert_eq!(ingestor.ledger().summary_stats().await.unwrap().total_jobs, 0);
    }

    #[tokio::test]
    async fn test_unknown_type_lists_columns() {
        let (ingestor, temp) = create_test_ingestor().await;
        let path = write(temp.path(), "mystery.csv", "Alpha,Beta\n1,2\n");

        match ingestor.process_file(&path).await {
            FileOutcome::Failed { error } => {
                assert_eq!(error, "Unknown file type. Columns found: Alpha, Beta");
            },
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(ingestor.ledger().summary_stats().await.unwrap().total_jobs, 0);
    }

    #[tokio::test]
    async fn test_header_only_file_is_empty() {
        let (ingestor, temp) = create_test_ingestor().await;
        let path = write(temp.path(), "subs.csv", "Submission Url,Project Title\n");

        assert_eq!(
            ingestor.process_file(&path).await,
            FileOutcome::Failed {
                error: "Empty or unreadable file".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_processed_file_clears_retry_copy() {
        let (ingestor, temp) = create_test_ingestor().await;
        let path = write(
            temp.path(),
            "regs.csv",
            "Hackathon Name,User ID,Country\nHackX,1,UK\nHackX,2,FR\n",
        );

        let outcome = ingestor.process_file(&path).await;
        assert_eq!(
            outcome,
            FileOutcome::Processed {
                kind: RecordKind::Registrant,
                rows: 2
            }
        );

        let hash = compute_file_hash(&path).unwrap();
        let job = ingestor.ledger().job_by_hash(&hash).await.unwrap().unwrap();
        assert!(job.retry_path.is_none());
        assert!(!ingestor
            .retry_copy_path(RecordKind::Registrant, &hash, "regs.csv")
            .exists());
    }

    #[tokio::test]
    async fn test_retry_reports_missing_copy() {
        let (ingestor, temp) = create_test_ingestor().await;
        let path = write(temp.path(), "subs.csv", "Submission Url\nhttps://x/1\n");
        let hash = compute_file_hash(&path).unwrap();

        // a corrupt store makes the merge fail after registration
        let store_path = ingestor.store().path(RecordKind::Submission);
        std::fs::write(&store_path, b"not parquet").unwrap();
        assert!(matches!(
            ingestor.process_file(&path).await,
            FileOutcome::Failed { .. }
        ));

        let copy = ingestor.retry_copy_path(RecordKind::Submission, &hash, "subs.csv");
        std::fs::remove_file(&copy).unwrap();

        let result = ingestor
            .retry(RetrySelection::Hashes(vec![hash.clone(), "nope".to_string()]))
            .await
            .unwrap();
        assert_eq!(result.summary.total_files, 0);
        assert_eq!(result.unretryable.len(), 2);
        assert!(result
            .unretryable
            .iter()
            .any(|u| u.hash == hash && u.reason == REUPLOAD_REQUIRED));
    }

    #[tokio::test]
    async fn test_delete_job_removes_copy_but_not_store() {
        let (ingestor, temp) = create_test_ingestor().await;
        let good = write(temp.path(), "a.csv", "Submission Url\nhttps://x/1\n");
        assert!(matches!(
            ingestor.process_file(&good).await,
            FileOutcome::Processed { .. }
        ));

        let store_path = ingestor.store().path(RecordKind::Submission);
        let store_bytes = std::fs::read(&store_path).unwrap();
        std::fs::write(&store_path, b"garbage").unwrap();

        let bad = write(temp.path(), "b.csv", "Submission Url\nhttps://x/2\n");
        assert!(matches!(ingestor.process_file(&bad).await, FileOutcome::Failed { .. }));
        std::fs::write(&store_path, &store_bytes).unwrap();

        let hash = compute_file_hash(&bad).unwrap();
        let job = ingestor.ledger().job_by_hash(&hash).await.unwrap().unwrap();
        let copy = job.retry_path.clone().unwrap();
        assert!(copy.exists());

        assert!(ingestor.delete_job(job.id).await.unwrap());
        assert!(!copy.exists());
        assert!(ingestor.ledger().job_by_id(job.id).await.unwrap().is_none());
        assert_eq!(
            ingestor.data_summary().await.unwrap().submissions.row_count,
            1
        );
    }

    #[tokio::test]
    async fn test_missing_folder_single_error() {
        let (ingestor, temp) = create_test_ingestor().await;
        let summary = ingestor
            .process_folder(&temp.path().join("absent"), |_, _, _| {})
            .await;
        assert_eq!(summary.total_files, 0);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].error, "Folder does not exist");
    }

    #[tokio::test]
    async fn test_register_after_concurrent_completion_drops_copy() {
        let (ingestor, temp) = create_test_ingestor().await;
        let path = write(temp.path(), "subs.csv", "Submission Url\nhttps://x/1\n");
        let hash = compute_file_hash(&path).unwrap();

        // another run registers and completes the same bytes first
        let other = ingestor
            .ledger()
            .start_job(&hash, "subs.csv", RecordKind::Submission, None)
            .await
            .unwrap();
        ingestor.ledger().complete_job(other.id, 1).await.unwrap();

        let registered = ingestor
            .register(&path, &hash, "subs.csv", RecordKind::Submission)
            .await
            .unwrap();
        assert!(registered.is_none());
        assert!(!ingestor
            .retry_copy_path(RecordKind::Submission, &hash, "subs.csv")
            .exists());
    }
}
