//! Utility functions for qwe
//!
//! Small helpers shared by the storage, diff and repository layers.
//!
//! ## Categories of Utilities
//!
//! ### Hashing
//! - Tracker keys for file paths and group names ([`hash_name`])
//! - Fresh object hashes for new blobs ([`mint_hash`])
//!
//! ### Line Model
//! - Splitting content into lines and joining them back ([`split_lines`], [`join_lines`])
//!
//! ### File Operations
//! - Atomic file writing through a temp file in the target directory
//! - Timestamps for commit records

use crate::error::{QweError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::trace;

/// Number of hex characters kept from a SHA-256 digest
pub const HASH_LEN: usize = 32;

/// Disambiguates hashes minted within the same clock tick
static MINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Hash arbitrary data using SHA-256, truncated to [`HASH_LEN`] hex characters
pub fn hash_data(data: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(data));
    digest[..HASH_LEN].to_string()
}

/// Tracker key for a file path or group name
///
/// The key is derived from the name exactly as the caller spelled it, so
/// `a.txt` and `./a.txt` are different files.
pub fn hash_name(name: &str) -> String {
    hash_data(name.as_bytes())
}

/// Fresh hash for a new object
///
/// Seeds the digest with `seed` (usually the file path), the current time in
/// nanoseconds and a process-wide counter.
pub fn mint_hash(seed: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let count = MINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    hash_data(format!("{}{}{}", seed, nanos, count).as_bytes())
}

/// Current time as an RFC 3339 string for commit records
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Split content into lines
///
/// Lines are separated by `\n`. A trailing `\r` is dropped from each line and
/// a final terminator does not produce an empty trailing line, so
/// `"a\nb\n"` and `"a\r\nb"` both yield `["a", "b"]`.
pub fn split_lines(content: &[u8]) -> Vec<Vec<u8>> {
    if content.is_empty() {
        return Vec::new();
    }
    let body = content.strip_suffix(b"\n").unwrap_or(content);
    body.split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line).to_vec())
        .collect()
}

/// Join lines back into content, terminating every line with `\n`
pub fn join_lines(lines: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    out
}

/// Atomic file write (write to temp file then rename)
///
/// The temporary file is created in the target's directory so the final
/// rename never crosses a filesystem. If any step fails the temp file is
/// removed and the target is left as it was.
///
/// # Errors
///
/// - [`QweError::Io`] if the temp file cannot be created or written
/// - [`QweError::Io`] if the rename fails
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| QweError::Io(e.error))?;

    trace!("Atomically wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

/// Remove a file, treating "already gone" as success
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
