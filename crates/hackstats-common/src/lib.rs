//! Hackstats Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Leaf utilities shared by the Hackstats ingest pipeline and its binaries.
//!
//! - **Error Handling**: [`HackstatsError`] and the [`Result`] alias
//! - **Checksums**: streaming SHA-256 content hashes used as file identity
//! - **Validation**: cheap pre-parse checks on candidate input files
//! - **Text**: whitespace cleaning and synonym-based token canonicalization
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//!
//! # Example
//!
//! ```no_run
//! use hackstats_common::checksum::compute_file_hash;
//! use hackstats_common::validate::{validate_file, SUPPORTED_EXTENSIONS};
//!
//! fn identify(path: &str) -> hackstats_common::Result<String> {
//!     validate_file(path, SUPPORTED_EXTENSIONS)?;
//!     compute_file_hash(path)
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod text;
pub mod types;
pub mod validate;

// Re-export commonly used types
pub use error::{HackstatsError, InvalidFileReason, Result};
pub use types::RecordKind;
