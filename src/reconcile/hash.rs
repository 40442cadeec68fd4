//! Content hashing of capture files

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Block size used for hashing and integrity reads
pub const READ_BLOCK_SIZE: usize = 64 * 1024;

/// Hex SHA-256 of a whole file
pub async fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BLOCK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether two files have identical content.
///
/// A missing file never matches anything.
pub async fn files_match(first: &Path, second: &Path) -> io::Result<bool> {
    if !first.is_file() || !second.is_file() {
        return Ok(false);
    }

    // Different sizes cannot hash equal; skip reading gigabytes of stream
    if file_size(first).await != file_size(second).await {
        return Ok(false);
    }

    let first_hash = file_sha256(first).await?;
    let second_hash = file_sha256(second).await?;
    Ok(first_hash == second_hash)
}

/// Size in bytes, 0 for missing files
pub async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .unwrap_or(0)
}

/// Read a file to EOF in fixed-size blocks and return the byte count
pub async fn read_fully(path: &Path) -> io::Result<u64> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buffer = vec![0u8; READ_BLOCK_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        total += bytes_read as u64;
    }

    Ok(total)
}
