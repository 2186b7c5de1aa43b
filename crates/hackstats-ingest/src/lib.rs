//! Hackstats Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingests hackathon submission and registrant spreadsheet exports into a
//! deduplicated Parquet store, tracking every file in a SQLite job ledger so
//! runs can be repeated and failed files replayed.
//!
//! # Pipeline
//!
//! - **Loader**: first sheet of `.xlsx`/`.xls`, or sniffed `.csv`/`.tsv`
//! - **Schema**: header-row repair, cleaning and de-duplication
//! - **Classify**: submission vs registrant from indicator columns
//! - **Clean**: text cleaning, date/number coercion, duplicate-column merge
//! - **Dedup**: natural or positional `_dedup_key` per row
//! - **Store**: first-wins merge into `{data_dir}/{kind}s/data.parquet`
//! - **Ledger**: hash-keyed job rows with retry bookkeeping
//!
//! # Example
//!
//! ```no_run
//! use hackstats_ingest::{IngestConfig, Ingestor};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ingestor = Ingestor::new(IngestConfig::from_env()?).await?;
//!     let summary = ingestor
//!         .process_folder(Path::new("./exports"), |idx, total, name| {
//!             println!("[{}/{}] {}", idx, total, name);
//!         })
//!         .await;
//!     println!("{} processed, {} failed", summary.processed_files, summary.failed_files);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod classify;
pub mod clean;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ledger;
pub mod loader;
pub mod orchestrator;
pub mod schema;
pub mod store;
pub mod table;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use ledger::{JobLedger, JobStatus, ProcessingJob};
pub use orchestrator::{
    BatchSummary, DataSummary, FileError, FileOutcome, Ingestor, RetrySelection, RetrySummary,
};
pub use table::{Column, Table, Value};
