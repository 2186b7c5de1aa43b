//! Common types used across Hackstats

use serde::{Deserialize, Serialize};

/// The two record families the pipeline knows how to ingest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Hackathon project entries, one per team and hackathon
    Submission,
    /// People who signed up for a hackathon
    Registrant,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Submission, RecordKind::Registrant];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Submission => "submission",
            RecordKind::Registrant => "registrant",
        }
    }

    /// Directory name used for this kind's store and retry copies
    pub fn dir_name(&self) -> &'static str {
        match self {
            RecordKind::Submission => "submissions",
            RecordKind::Registrant => "registrants",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = crate::HackstatsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "submission" | "submissions" => Ok(RecordKind::Submission),
            "registrant" | "registrants" => Ok(RecordKind::Registrant),
            other => Err(crate::HackstatsError::parse(format!("unknown record kind: {}", other))),
        }
    }
}
