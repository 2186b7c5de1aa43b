//! Hackstats Ingest - spreadsheet ingestion tool

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::Table;
use hackstats_common::logging::{init_logging, LogConfig, LogLevel};
use hackstats_common::text::{canonical_tokens, Synonyms};
use hackstats_ingest::ledger::LedgerStats;
use hackstats_ingest::store::StoreSummary;
use hackstats_ingest::{
    BatchSummary, DataSummary, FileOutcome, IngestConfig, Ingestor, ProcessingJob, RetrySelection,
    RetrySummary,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "hackstats-ingest")]
#[command(author, version, about = "Hackathon spreadsheet ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Canonical store root (overrides DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Archive extraction scratch space (overrides TEMP_DIR)
    #[arg(long, global = true)]
    temp_dir: Option<PathBuf>,

    /// Retry-copy storage (overrides RETRY_DIR)
    #[arg(long, global = true)]
    retry_dir: Option<PathBuf>,

    /// Job ledger database file (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    database_path: Option<PathBuf>,

    /// Work-experience ceiling in years (overrides MAX_WORK_EXPERIENCE)
    #[arg(long, global = true)]
    max_work_experience: Option<f64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a single spreadsheet
    File { path: PathBuf },

    /// Ingest every spreadsheet directly inside a folder
    Folder { path: PathBuf },

    /// Ingest every spreadsheet inside a zip archive
    Zip { path: PathBuf },

    /// Replay failed jobs from their retry copies
    Retry {
        /// File hash to retry (repeatable)
        #[arg(long = "hash")]
        hashes: Vec<String>,

        /// Retry every failed or interrupted job
        #[arg(long, conflicts_with = "hashes")]
        all: bool,
    },

    /// List jobs, newest first
    Jobs {
        /// Only failed jobs
        #[arg(long)]
        failed: bool,

        /// Maximum number of jobs to show
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Show one job
    Job { id: i64 },

    /// Delete a job and its retry copy (the store is not touched)
    DeleteJob { id: i64 },

    /// Job counts by status
    Stats,

    /// Row and column counts of the canonical stores
    Summary,

    /// Canonicalize delimited values through the synonym tables
    Normalize {
        #[arg(long, value_enum)]
        kind: TokenKind,

        /// Token delimiter inside each value
        #[arg(long, default_value_t = ',')]
        delimiter: char,

        values: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TokenKind {
    Technologies,
    Skills,
}

impl Cli {
    fn ingest_config(&self) -> Result<IngestConfig> {
        let mut config = IngestConfig::from_env()?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.temp_dir {
            config.temp_dir = dir.clone();
        }
        if let Some(dir) = &self.retry_dir {
            config.retry_dir = dir.clone();
        }
        if let Some(path) = &self.database_path {
            config.database_path = path.clone();
        }
        if let Some(ceiling) = self.max_work_experience {
            config.max_work_experience = ceiling;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("hackstats-ingest")
        .filter_directives("sqlx=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = cli.ingest_config()?;

    if let Command::Normalize {
        kind,
        delimiter,
        values,
    } = &cli.command
    {
        let synonyms = Synonyms::load(&config.synonyms_path)?;
        let table = match kind {
            TokenKind::Technologies => &synonyms.technologies,
            TokenKind::Skills => &synonyms.skills,
        };
        let normalized: Vec<(String, Vec<String>)> = values
            .iter()
            .map(|value| (value.clone(), canonical_tokens(value, *delimiter, table)))
            .collect();

        if cli.json {
            return print_json(&normalized);
        }
        let mut out = Table::new();
        out.set_header(vec!["Value", "Canonical tokens"]);
        for (value, tokens) in &normalized {
            out.add_row(vec![value.clone(), tokens.join(", ")]);
        }
        println!("{}", out);
        return Ok(());
    }

    let ingestor = Ingestor::new(config)
        .await
        .context("Failed to initialise ingestor")?;

    match &cli.command {
        Command::File { path } => {
            let outcome = ingestor.process_file(path).await;
            if cli.json {
                print_json(&outcome)?;
            } else {
                print_outcome(&outcome);
            }
            if let FileOutcome::Failed { .. } = outcome {
                bail!("{} was not ingested", path.display());
            }
        },
        Command::Folder { path } => {
            info!(folder = %path.display(), "Ingesting folder");
            let progress = progress_bar(cli.json)?;
            let summary = ingestor
                .process_folder(path, |idx, total, name| report(&progress, idx, total, name))
                .await;
            progress.finish_and_clear();
            emit_batch(&summary, cli.json)?;
        },
        Command::Zip { path } => {
            info!(archive = %path.display(), "Ingesting archive");
            let progress = progress_bar(cli.json)?;
            let summary = ingestor
                .process_zip(path, |idx, total, name| report(&progress, idx, total, name))
                .await;
            progress.finish_and_clear();
            emit_batch(&summary, cli.json)?;
        },
        Command::Retry { hashes, all } => {
            let selection = match (*all, hashes.is_empty()) {
                (true, _) => RetrySelection::All,
                (false, false) => RetrySelection::Hashes(hashes.clone()),
                (false, true) => bail!("Pass --all or at least one --hash"),
            };
            let result = ingestor.retry(selection).await?;
            if cli.json {
                print_json(&result)?;
            } else {
                print_retry(&result);
            }
        },
        Command::Jobs { failed, limit } => {
            let jobs = if *failed {
                ingestor.ledger().failed_jobs().await?
            } else {
                ingestor.ledger().history(*limit).await?
            };
            if cli.json {
                print_json(&jobs)?;
            } else {
                print_jobs(&jobs);
            }
        },
        Command::Job { id } => match ingestor.ledger().job_by_id(*id).await? {
            Some(job) if cli.json => print_json(&job)?,
            Some(job) => print_job(&job),
            None => bail!("No job with id {}", id),
        },
        Command::DeleteJob { id } => {
            if !ingestor.delete_job(*id).await? {
                bail!("No job with id {}", id);
            }
            if !cli.json {
                println!("Deleted job {}", id);
            }
        },
        Command::Stats => {
            let stats = ingestor.ledger().summary_stats().await?;
            if cli.json {
                print_json(&stats)?;
            } else {
                print_stats(&stats);
            }
        },
        Command::Summary => {
            let summary = ingestor.data_summary().await?;
            if cli.json {
                print_json(&summary)?;
            } else {
                print_data_summary(&summary);
            }
        },
        Command::Normalize { .. } => {},
    }

    ingestor.ledger().close().await;
    Ok(())
}

fn progress_bar(hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn report(pb: &ProgressBar, idx: usize, total: usize, name: &str) {
    pb.set_length(total as u64);
    pb.set_position(idx.saturating_sub(1) as u64);
    pb.set_message(name.to_string());
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_outcome(outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Processed { kind, rows } => println!("Processed {} {} rows", rows, kind),
        FileOutcome::Skipped { reason } => println!("Skipped: {}", reason),
        FileOutcome::Failed { error } => println!("Failed: {}", error),
    }
}

fn emit_batch(summary: &BatchSummary, json: bool) -> Result<()> {
    if json {
        print_json(summary)
    } else {
        print_batch(summary);
        Ok(())
    }
}

fn print_batch(summary: &BatchSummary) {
    let mut counts = Table::new();
    counts.set_header(vec!["Total", "Processed", "Skipped", "Failed"]);
    counts.add_row(vec![
        summary.total_files.to_string(),
        summary.processed_files.to_string(),
        summary.skipped_files.to_string(),
        summary.failed_files.to_string(),
    ]);
    println!("{}", counts);

    if !summary.errors.is_empty() {
        let mut errors = Table::new();
        errors.set_header(vec!["File", "Error"]);
        for error in &summary.errors {
            errors.add_row(vec![error.file.clone(), error.error.clone()]);
        }
        println!("{}", errors);
    }
}

fn print_retry(result: &RetrySummary) {
    print_batch(&result.summary);
    if !result.unretryable.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Hash", "File", "Reason"]);
        for job in &result.unretryable {
            table.add_row(vec![
                job.hash.clone(),
                job.file_name.clone().unwrap_or_default(),
                job.reason.clone(),
            ]);
        }
        println!("{}", table);
    }
}

fn print_jobs(jobs: &[ProcessingJob]) {
    if jobs.is_empty() {
        println!("No jobs");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec!["ID", "File", "Type", "Status", "Rows", "Attempts", "Created", "Error"]);
    for job in jobs {
        table.add_row(vec![
            job.id.to_string(),
            job.file_name.clone(),
            job.file_type.to_string(),
            job.status.to_string(),
            job.row_count.map(|n| n.to_string()).unwrap_or_default(),
            job.attempts.to_string(),
            job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            job.error_message.clone().unwrap_or_default(),
        ]);
    }
    println!("{}", table);
}

fn print_job(job: &ProcessingJob) {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    let rows = [
        ("ID", job.id.to_string()),
        ("File hash", job.file_hash.clone()),
        ("File name", job.file_name.clone()),
        ("Type", job.file_type.to_string()),
        ("Status", job.status.to_string()),
        ("Rows", job.row_count.map(|n| n.to_string()).unwrap_or_default()),
        ("Attempts", job.attempts.to_string()),
        ("Created", job.created_at.to_rfc3339()),
        (
            "Completed",
            job.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ),
        (
            "Retry copy",
            job.retry_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ),
        ("Error", job.error_message.clone().unwrap_or_default()),
    ];
    for (field, value) in rows {
        table.add_row(vec![field.to_string(), value]);
    }
    println!("{}", table);
}

fn print_stats(stats: &LedgerStats) {
    let mut table = Table::new();
    table.set_header(vec!["Jobs", "Completed", "Failed", "Processing", "Rows ingested"]);
    table.add_row(vec![
        stats.total_jobs.to_string(),
        stats.completed.to_string(),
        stats.failed.to_string(),
        stats.processing.to_string(),
        stats.total_rows.to_string(),
    ]);
    println!("{}", table);
}

fn print_data_summary(summary: &DataSummary) {
    let mut table = Table::new();
    table.set_header(vec!["Store", "Exists", "Rows", "Columns"]);
    let stores: [(&str, &StoreSummary); 2] = [
        ("submissions", &summary.submissions),
        ("registrants", &summary.registrants),
    ];
    for (name, store) in stores {
        table.add_row(vec![
            name.to_string(),
            store.exists.to_string(),
            store.row_count.to_string(),
            store.columns.len().to_string(),
        ]);
    }
    println!("{}", table);
}
