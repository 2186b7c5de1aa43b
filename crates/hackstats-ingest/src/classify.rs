//! Record-kind detection from a table's column set
//!
//! Exports are inconsistently labeled, so detection is tiered: indicator
//! scores first, then a single strong column, then the file name.

use crate::table::{name_key, Table};
use hackstats_common::RecordKind;
use std::collections::HashSet;

/// Columns that mark a submission export
pub const SUBMISSION_INDICATORS: &[&str] = &[
    "organization name",
    "challenge title",
    "project title",
    "submission url",
    "built with",
];

/// Columns that mark a registrant export
pub const REGISTRANT_INDICATORS: &[&str] = &[
    "hackathon name",
    "user id",
    "country",
    "work experience",
    "skills",
    "occupation",
    "specialty",
];

/// Minimum indicator score for a confident match
pub const SCORE_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Known(RecordKind),
    Unknown,
}

impl Classification {
    pub fn kind(self) -> Option<RecordKind> {
        match self {
            Classification::Known(kind) => Some(kind),
            Classification::Unknown => None,
        }
    }
}

/// Count of `indicators` present among `columns`
fn score(columns: &HashSet<String>, indicators: &[&str]) -> usize {
    indicators
        .iter()
        .filter(|indicator| columns.contains(&name_key(indicator)))
        .count()
}

/// Decide whether a normalized table holds submissions or registrants
pub fn classify(table: &Table, file_name: &str) -> Classification {
    let columns: HashSet<String> = table.columns().iter().map(|c| name_key(&c.name)).collect();

    let submission_score = score(&columns, SUBMISSION_INDICATORS);
    let registrant_score = score(&columns, REGISTRANT_INDICATORS);
    tracing::debug!(
        file = %file_name,
        submission_score,
        registrant_score,
        "Scored column set"
    );

    if submission_score >= SCORE_THRESHOLD && submission_score >= registrant_score {
        return Classification::Known(RecordKind::Submission);
    }
    if registrant_score >= SCORE_THRESHOLD {
        return Classification::Known(RecordKind::Registrant);
    }

    if columns.contains("submission url") {
        return Classification::Known(RecordKind::Submission);
    }
    if columns.contains("user id") {
        return Classification::Known(RecordKind::Registrant);
    }

    let lowered = file_name.to_lowercase();
    if lowered.contains("registrant") {
        Classification::Known(RecordKind::Registrant)
    } else if lowered.contains("submission") {
        Classification::Known(RecordKind::Submission)
    } else {
        Classification::Unknown
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn with_columns(names: &[&str]) -> Table {
        Table::from_rows(names.iter().map(|s| s.to_string()).collect(), vec![]).unwrap()
    }

    #[test]
    fn test_submission_wins_tie_break() {
        let table = with_columns(&[
            "Organization Name",
            "Challenge Title",
            "Project Title",
            "Hackathon Name",
            "User ID",
        ]);
        assert_eq!(
            classify(&table, "export.xlsx"),
            Classification::Known(RecordKind::Submission)
        );
    }

    #[test]
    fn test_registrant_by_score() {
        let table = with_columns(&["Hackathon Name", "User ID", "Country", "Skills"]);
        assert_eq!(
            classify(&table, "export.csv"),
            Classification::Known(RecordKind::Registrant)
        );
    }

    #[test]
    fn test_registrant_outscores_submission() {
        let table = with_columns(&[
            "Project Title",
            "Submission Url",
            "Built With",
            "Hackathon Name",
            "User ID",
            "Country",
            "Skills",
        ]);
        assert_eq!(
            classify(&table, "mixed.csv"),
            Classification::Known(RecordKind::Registrant)
        );
    }

    #[test]
    fn test_single_strong_signal() {
        assert_eq!(
            classify(&with_columns(&["submission  URL", "Notes"]), "a.csv"),
            Classification::Known(RecordKind::Submission)
        );
        assert_eq!(
            classify(&with_columns(&["User ID", "Notes"]), "a.csv"),
            Classification::Known(RecordKind::Registrant)
        );
    }

    #[test]
    fn test_file_name_fallback() {
        let table = with_columns(&["Notes"]);
        assert_eq!(
            classify(&table, "Spring_Registrants.xlsx"),
            Classification::Known(RecordKind::Registrant)
        );
        assert_eq!(
            classify(&table, "final-submissions.csv"),
            Classification::Known(RecordKind::Submission)
        );
        assert_eq!(classify(&table, "notes.csv"), Classification::Unknown);
    }
}
