//! End-to-end tests for the ingestion pipeline
#![allow(clippy::unwrap_used, clippy::expect_used)]

use hackstats_common::checksum::compute_file_hash;
use hackstats_common::RecordKind;
use hackstats_ingest::orchestrator::ALREADY_PROCESSED;
use hackstats_ingest::{
    FileOutcome, IngestConfig, Ingestor, JobStatus, RetrySelection, Table, Value,
};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::FileOptions;

const SUBMISSIONS_HEADER: &str = "Submission Url,Project Title,Built With";

async fn setup() -> (Ingestor, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = IngestConfig::rooted_at(temp_dir.path());
    let ingestor = Ingestor::new(config).await.unwrap();
    (ingestor, temp_dir)
}

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn stored(ingestor: &Ingestor, kind: RecordKind) -> Table {
    ingestor.store().read(kind).unwrap().expect("store should exist")
}

fn column_text(table: &Table, name: &str) -> Vec<String> {
    table
        .column(name)
        .unwrap()
        .values
        .iter()
        .map(Value::render)
        .collect()
}

#[tokio::test]
async fn test_end_to_end_submission_file() {
    let (ingestor, temp) = setup().await;
    let path = write_file(
        temp.path(),
        "submissions.csv",
        &format!("{}\nhttps://x/1,Alpha,rust\nhttps://x/2,Beta,go\n", SUBMISSIONS_HEADER),
    );

    let outcome = ingestor.process_file(&path).await;
    assert_eq!(
        outcome,
        FileOutcome::Processed {
            kind: RecordKind::Submission,
            rows: 2
        }
    );

    let summary = ingestor.data_summary().await.unwrap();
    assert!(summary.submissions.exists);
    assert_eq!(summary.submissions.row_count, 2);
    assert!(!summary.registrants.exists);

    let hash = compute_file_hash(&path).unwrap();
    let job = ingestor.ledger().job_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.row_count, Some(2));
    assert_eq!(job.file_type, RecordKind::Submission);
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn test_reprocessing_same_bytes_is_skipped() {
    let (ingestor, temp) = setup().await;
    let path = write_file(
        temp.path(),
        "subs.csv",
        &format!("{}\nhttps://x/1,Alpha,rust\n", SUBMISSIONS_HEADER),
    );

    assert!(matches!(
        ingestor.process_file(&path).await,
        FileOutcome::Processed { rows: 1, .. }
    ));
    let before = ingestor.data_summary().await.unwrap().submissions.row_count;

    assert_eq!(
        ingestor.process_file(&path).await,
        FileOutcome::Skipped {
            reason: ALREADY_PROCESSED.to_string()
        }
    );

    // renaming does not change the content hash
    let renamed = temp.path().join("renamed.csv");
    std::fs::copy(&path, &renamed).unwrap();
    assert!(matches!(
        ingestor.process_file(&renamed).await,
        FileOutcome::Skipped { .. }
    ));

    assert_eq!(ingestor.data_summary().await.unwrap().submissions.row_count, before);
    assert_eq!(ingestor.ledger().summary_stats().await.unwrap().total_jobs, 1);
}

#[tokio::test]
async fn test_duplicate_url_keeps_first_row() {
    let (ingestor, temp) = setup().await;
    let first = write_file(
        temp.path(),
        "first.csv",
        &format!("{}\nhttps://x/1,First,rust\n", SUBMISSIONS_HEADER),
    );
    let second = write_file(
        temp.path(),
        "second.csv",
        &format!(
            "{}\nhttps://x/1,Second,rust\nhttps://x/2,Other,go\n",
            SUBMISSIONS_HEADER
        ),
    );

    assert!(matches!(
        ingestor.process_file(&first).await,
        FileOutcome::Processed { .. }
    ));
    assert!(matches!(
        ingestor.process_file(&second).await,
        FileOutcome::Processed { rows: 2, .. }
    ));

    let table = stored(&ingestor, RecordKind::Submission);
    assert_eq!(table.row_count(), 2);
    assert_eq!(
        column_text(&table, "Submission Url"),
        vec!["https://x/1", "https://x/2"]
    );
    assert_eq!(column_text(&table, "Project Title"), vec!["First", "Other"]);
}

#[tokio::test]
async fn test_placeholder_header_row_is_repaired() {
    let (ingestor, temp) = setup().await;
    let path = write_file(
        temp.path(),
        "export.csv",
        &format!(",,\n{}\nhttps://x/1,Alpha,rust\n", SUBMISSIONS_HEADER),
    );

    assert_eq!(
        ingestor.process_file(&path).await,
        FileOutcome::Processed {
            kind: RecordKind::Submission,
            rows: 1
        }
    );

    let table = stored(&ingestor, RecordKind::Submission);
    assert!(table.column("Submission Url").is_some());
    assert!(table.column("Built With").is_some());
    assert!(table.column_names().iter().all(|n| !n.starts_with("Unnamed")));
}

#[tokio::test]
async fn test_tied_scores_classify_as_submission() {
    let (ingestor, temp) = setup().await;
    let path = write_file(
        temp.path(),
        "mixed.csv",
        "Submission Url,Project Title,Built With,Hackathon Name,User ID,Country\n\
         https://x/1,Alpha,rust,HackX,7,UK\n",
    );

    assert!(matches!(
        ingestor.process_file(&path).await,
        FileOutcome::Processed {
            kind: RecordKind::Submission,
            ..
        }
    ));
}

#[tokio::test]
async fn test_work_experience_over_ceiling_is_nulled() {
    let (ingestor, temp) = setup().await;
    let path = write_file(
        temp.path(),
        "registrants.csv",
        "Hackathon Name,User ID,Country,Work Experience\nHackX,1,UK,5\nHackX,2,FR,200\n",
    );

    assert!(matches!(
        ingestor.process_file(&path).await,
        FileOutcome::Processed {
            kind: RecordKind::Registrant,
            rows: 2
        }
    ));

    let table = stored(&ingestor, RecordKind::Registrant);
    let experience = &table.column("Work Experience").unwrap().values;
    assert_eq!(experience[0], Value::Number(5.0));
    assert!(experience[1].is_null());
}

#[tokio::test]
async fn test_failed_merge_is_replayed_from_retry_copy() {
    let (ingestor, temp) = setup().await;
    let path = write_file(
        temp.path(),
        "subs.csv",
        &format!("{}\nhttps://x/1,Alpha,rust\n", SUBMISSIONS_HEADER),
    );
    let hash = compute_file_hash(&path).unwrap();

    let store_path = ingestor.store().path(RecordKind::Submission);
    std::fs::write(&store_path, b"not parquet").unwrap();
    assert!(matches!(
        ingestor.process_file(&path).await,
        FileOutcome::Failed { .. }
    ));

    let failed = ingestor.ledger().job_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error_message.is_some());
    let copy = failed.retry_path.clone().unwrap();
    assert!(copy.is_file());

    // the original upload is gone; only the retry copy remains
    std::fs::remove_file(&path).unwrap();
    std::fs::remove_file(&store_path).unwrap();

    let result = ingestor
        .retry(RetrySelection::Hashes(vec![hash.clone()]))
        .await
        .unwrap();
    assert_eq!(result.summary.total_files, 1);
    assert_eq!(result.summary.processed_files, 1);
    assert!(result.unretryable.is_empty());

    let job = ingestor.ledger().job_by_hash(&hash).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 2);
    assert!(job.retry_path.is_none());
    assert!(!copy.exists());
    assert_eq!(ingestor.data_summary().await.unwrap().submissions.row_count, 1);
}

#[tokio::test]
async fn test_retry_all_skips_nothing_when_ledger_clean() {
    let (ingestor, temp) = setup().await;
    let path = write_file(
        temp.path(),
        "subs.csv",
        &format!("{}\nhttps://x/1,Alpha,rust\n", SUBMISSIONS_HEADER),
    );
    assert!(matches!(
        ingestor.process_file(&path).await,
        FileOutcome::Processed { .. }
    ));

    let result = ingestor.retry(RetrySelection::All).await.unwrap();
    assert_eq!(result.summary.total_files, 0);
    assert!(result.unretryable.is_empty());
}

#[tokio::test]
async fn test_folder_with_empty_file_continues() {
    let (ingestor, temp) = setup().await;
    let folder = temp.path().join("batch");
    std::fs::create_dir_all(&folder).unwrap();

    for (idx, name) in ["a.csv", "b.csv", "c.csv", "d.csv", "e.csv"].iter().enumerate() {
        if idx == 2 {
            write_file(&folder, name, "");
        } else {
            write_file(
                &folder,
                name,
                &format!("{}\nhttps://x/{},Project {},rust\n", SUBMISSIONS_HEADER, idx, idx),
            );
        }
    }
    write_file(&folder, "notes.txt", "not a spreadsheet");

    let mut seen = Vec::new();
    let summary = ingestor
        .process_folder(&folder, |idx, total, name| {
            seen.push((idx, total, name.to_string()));
        })
        .await;

    assert_eq!(summary.total_files, 5);
    assert_eq!(summary.processed_files, 4);
    assert_eq!(summary.failed_files, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].file, "c.csv");
    assert_eq!(seen.first(), Some(&(1, 5, "a.csv".to_string())));
    assert_eq!(seen.last(), Some(&(5, 5, "e.csv".to_string())));

    assert_eq!(ingestor.data_summary().await.unwrap().submissions.row_count, 4);
}

#[tokio::test]
async fn test_zip_batch_ingests_both_kinds() {
    let (ingestor, temp) = setup().await;
    let archive = temp.path().join("export.zip");
    {
        let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
        let entries: [(&str, String); 3] = [
            (
                "exports/subs.csv",
                format!("{}\nhttps://x/1,Alpha,rust\n", SUBMISSIONS_HEADER),
            ),
            (
                "exports/regs.csv",
                "Hackathon Name,User ID,Country\nHackX,1,UK\nHackX,2,FR\n".to_string(),
            ),
            ("__MACOSX/exports/._subs.csv", "junk".to_string()),
        ];
        for (name, data) in entries {
            writer.start_file(name, FileOptions::default()).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    let summary = ingestor.process_zip(&archive, |_, _, _| {}).await;
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.processed_files, 2);
    assert!(summary.errors.is_empty());

    let data = ingestor.data_summary().await.unwrap();
    assert_eq!(data.submissions.row_count, 1);
    assert_eq!(data.registrants.row_count, 2);

    // scratch extraction directories are cleaned up
    let leftovers = std::fs::read_dir(temp.path().join("temp")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_distinct_user_ids_are_not_merged() {
    let (ingestor, temp) = setup().await;
    let path = write_file(
        temp.path(),
        "registrants.csv",
        "Hackathon Name,User ID,Country\n\
         H,007,UK\nH,7,FR\nH,12345678901234567,DE\nH,12345678901234568,ES\n",
    );

    assert!(matches!(
        ingestor.process_file(&path).await,
        FileOutcome::Processed { rows: 4, .. }
    ));

    let table = stored(&ingestor, RecordKind::Registrant);
    assert_eq!(table.row_count(), 4);
    assert_eq!(
        column_text(&table, "User ID"),
        vec!["007", "7", "12345678901234567", "12345678901234568"]
    );
}

#[tokio::test]
async fn test_repeated_columns_merge_before_keying() {
    let (ingestor, temp) = setup().await;
    let first = write_file(
        temp.path(),
        "first.csv",
        "Submission Url,Project Title,Submission Url,Project Title,Built With\n,A,https://x/1,Alt,rust\n",
    );
    let second = write_file(
        temp.path(),
        "second.csv",
        &format!("{}\nhttps://x/1,B,go\n", SUBMISSIONS_HEADER),
    );

    assert!(matches!(
        ingestor.process_file(&first).await,
        FileOutcome::Processed { .. }
    ));
    assert!(matches!(
        ingestor.process_file(&second).await,
        FileOutcome::Processed { .. }
    ));

    let table = stored(&ingestor, RecordKind::Submission);
    assert_eq!(table.row_count(), 1);
    assert!(table
        .column_names()
        .iter()
        .all(|name| name != "Submission Url.1" && name != "Project Title.1"));
    assert_eq!(column_text(&table, "Project Title"), vec!["A"]);
}

#[tokio::test]
async fn test_float_word_header_is_kept() {
    let (ingestor, temp) = setup().await;
    let path = write_file(
        temp.path(),
        "subs.csv",
        &format!("{},NaN\nhttps://x/1,A,rust,1\n", SUBMISSIONS_HEADER),
    );

    assert!(matches!(
        ingestor.process_file(&path).await,
        FileOutcome::Processed { rows: 1, .. }
    ));
    let table = stored(&ingestor, RecordKind::Submission);
    assert!(table.column("NaN").is_some());
}

#[tokio::test]
async fn test_title_line_above_header_is_repaired() {
    let (ingestor, temp) = setup().await;
    let path = write_file(
        temp.path(),
        "subs.csv",
        &format!("Spring Hackathon export\n{}\nhttps://x/1,A,rust\n", SUBMISSIONS_HEADER),
    );

    assert_eq!(
        ingestor.process_file(&path).await,
        FileOutcome::Processed {
            kind: RecordKind::Submission,
            rows: 1
        }
    );
}
