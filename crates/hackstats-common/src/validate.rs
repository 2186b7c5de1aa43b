//! Cheap structural checks run before any parse is attempted

use crate::error::{HackstatsError, InvalidFileReason, Result};
use std::path::Path;

/// File extensions the ingest pipeline knows how to load
pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv", "tsv"];

/// Lower-cased extension of a path, if any
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Reject missing files, unsupported extensions and zero-byte files
pub fn validate_file(path: impl AsRef<Path>, allowed_extensions: &[&str]) -> Result<()> {
    let path = path.as_ref();
    let display = path.display().to_string();

    if !path.is_file() {
        return Err(HackstatsError::invalid_file(display, InvalidFileReason::Missing));
    }

    let supported = extension_of(path)
        .map(|ext| allowed_extensions.iter().any(|allowed| *allowed == ext))
        .unwrap_or(false);
    if !supported {
        return Err(HackstatsError::invalid_file(
            display,
            InvalidFileReason::UnsupportedExtension,
        ));
    }

    if std::fs::metadata(path)?.len() == 0 {
        return Err(HackstatsError::invalid_file(display, InvalidFileReason::Empty));
    }

    Ok(())
}

/// Boolean form of [`validate_file`]
pub fn is_valid_file(path: impl AsRef<Path>, allowed_extensions: &[&str]) -> bool {
    validate_file(path, allowed_extensions).is_ok()
}
