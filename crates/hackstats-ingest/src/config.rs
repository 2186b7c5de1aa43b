//! Configuration management
//!
//! The ingest core reads its settings from the environment (optionally
//! seeded from a `.env` file); the CLI may override individual values.

use crate::error::{IngestError, Result};
use hackstats_common::RecordKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default root directory of the canonical store.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default scratch directory for archive extraction.
pub const DEFAULT_TEMP_DIR: &str = "./temp";

/// Default directory for retained copies of registered files.
pub const DEFAULT_RETRY_DIR: &str = "./data/retry";

/// Default SQLite file for the job ledger.
pub const DEFAULT_DATABASE_PATH: &str = "./jobs.db";

/// Default ceiling above which a work-experience value is treated as a typo.
pub const DEFAULT_MAX_WORK_EXPERIENCE: f64 = 50.0;

/// Default location of the technology/skill synonym tables.
pub const DEFAULT_SYNONYMS_PATH: &str = "./synonyms.json";

/// Ingest pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub retry_dir: PathBuf,
    pub database_path: PathBuf,
    pub max_work_experience: f64,
    pub synonyms_path: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            retry_dir: PathBuf::from(DEFAULT_RETRY_DIR),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            max_work_experience: DEFAULT_MAX_WORK_EXPERIENCE,
            synonyms_path: PathBuf::from(DEFAULT_SYNONYMS_PATH),
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment and defaults
    ///
    /// Environment variables:
    /// - `DATA_DIR`, `TEMP_DIR`, `RETRY_DIR`, `DATABASE_PATH`, `SYNONYMS_PATH`
    /// - `MAX_WORK_EXPERIENCE`: numeric ceiling for the work-experience field
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = IngestConfig {
            data_dir: env_path("DATA_DIR", DEFAULT_DATA_DIR),
            temp_dir: env_path("TEMP_DIR", DEFAULT_TEMP_DIR),
            retry_dir: env_path("RETRY_DIR", DEFAULT_RETRY_DIR),
            database_path: env_path("DATABASE_PATH", DEFAULT_DATABASE_PATH),
            max_work_experience: match std::env::var("MAX_WORK_EXPERIENCE") {
                Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    tracing::warn!(value = %raw, "Invalid MAX_WORK_EXPERIENCE, using default");
                    DEFAULT_MAX_WORK_EXPERIENCE
                }),
                Err(_) => DEFAULT_MAX_WORK_EXPERIENCE,
            },
            synonyms_path: env_path("SYNONYMS_PATH", DEFAULT_SYNONYMS_PATH),
        };

        config.validate()?;

        Ok(config)
    }

    /// Build a configuration rooted entirely under one directory
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("data"),
            temp_dir: root.join("temp"),
            retry_dir: root.join("data").join("retry"),
            database_path: root.join("jobs.db"),
            max_work_experience: DEFAULT_MAX_WORK_EXPERIENCE,
            synonyms_path: root.join("synonyms.json"),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("data_dir", &self.data_dir),
            ("temp_dir", &self.temp_dir),
            ("retry_dir", &self.retry_dir),
            ("database_path", &self.database_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(IngestError::config(format!("{} cannot be empty", name)));
            }
        }

        if !self.max_work_experience.is_finite() || self.max_work_experience <= 0.0 {
            return Err(IngestError::config(format!(
                "max_work_experience must be a positive number, got {}",
                self.max_work_experience
            )));
        }

        Ok(())
    }

    /// Directory holding the canonical store for a record kind
    pub fn store_dir(&self, kind: RecordKind) -> PathBuf {
        self.data_dir.join(kind.dir_name())
    }

    /// Directory holding retry copies for a record kind
    pub fn retry_dir_for(&self, kind: RecordKind) -> PathBuf {
        self.retry_dir.join(kind.dir_name())
    }
}

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}
