//! Content hashing for ingest idempotency
//!
//! The SHA-256 digest of a file's bytes is the only identity the pipeline
//! trusts: two files with the same bytes are the same file, whatever their
//! names or locations.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

const CHUNK_SIZE: usize = 8192;

/// Compute the lowercase hex SHA-256 digest of a file
pub fn compute_file_hash(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_hash(&mut file)
}

/// Compute the lowercase hex SHA-256 digest of any readable source
pub fn compute_hash<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
