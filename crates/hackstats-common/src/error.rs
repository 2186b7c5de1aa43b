//! Error types for Hackstats

use thiserror::Error;

/// Result type alias for Hackstats operations
pub type Result<T> = std::result::Result<T, HackstatsError>;

/// Why a file was rejected before any parse was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidFileReason {
    /// Path does not exist or is not a regular file
    Missing,
    /// Extension is not one of the accepted ones
    UnsupportedExtension,
    /// Zero-byte file
    Empty,
}

impl std::fmt::Display for InvalidFileReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidFileReason::Missing => write!(f, "file does not exist"),
            InvalidFileReason::UnsupportedExtension => write!(f, "unsupported file extension"),
            InvalidFileReason::Empty => write!(f, "file is empty"),
        }
    }
}

/// Main error type for Hackstats
#[derive(Error, Debug)]
pub enum HackstatsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid file '{path}': {reason}")]
    InvalidFile {
        path: String,
        reason: InvalidFileReason,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl HackstatsError {
    pub fn invalid_file(path: impl Into<String>, reason: InvalidFileReason) -> Self {
        Self::InvalidFile {
            path: path.into(),
            reason,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
