//! Candidate discovery and zip extraction for batch input

use crate::error::Result;
use hackstats_common::validate::{extension_of, SUPPORTED_EXTENSIONS};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Metadata directory macOS adds to archives
const MACOS_METADATA_DIR: &str = "__MACOSX";

/// Hidden, editor temp/lock files, and platform metadata
fn is_junk_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('~') || name == MACOS_METADATA_DIR
}

/// Whether a file name looks like an ingestible spreadsheet
pub fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if is_junk_name(name) {
        return false;
    }
    extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Candidate files under `dir`, sorted by path
///
/// Non-recursive scans look at direct children only. Hidden and metadata
/// directories are never descended into.
pub fn collect_candidates(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut walker = WalkDir::new(dir).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    let entries = walker.into_iter().filter_entry(|entry: &DirEntry| {
        entry.depth() == 0 || !is_junk_name(&entry.file_name().to_string_lossy())
    });
    for entry in entries {
        let entry = entry.map_err(|e| io::Error::other(e.to_string()))?;
        if entry.file_type().is_file() && is_candidate(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Extract a zip archive into `dest`
///
/// Entries whose names would escape `dest` are skipped, as is anything under
/// a metadata directory or with a hidden/temp name. Returns the number of
/// files written.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(entry = %entry.name(), "Skipping archive entry outside extraction root");
            continue;
        };

        let junk = relative
            .components()
            .any(|c| is_junk_name(&c.as_os_str().to_string_lossy()));
        if junk {
            debug!(entry = %relative.display(), "Skipping metadata or hidden entry");
            continue;
        }

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        extracted += 1;
    }

    debug!(archive = %archive_path.display(), files = extracted, "Extracted archive");
    Ok(extracted)
}
