//! Content codec: line tokens and text/binary classification
//!
//! Diff rows embed each changed line as a standard base64 token. The base64
//! alphabet cannot produce the row separator, so arbitrary line content
//! (including `" @@@ "` itself, or invalid UTF-8) round-trips safely.

use crate::error::{QweError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Default number of bytes sampled by [`classify`]
pub const DEFAULT_SAMPLE_SIZE: usize = 1024;

/// Storage strategy chosen for a file when it starts being tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Line-diffed text
    Text,
    /// Full snapshots, compared byte-for-byte
    Binary,
}

/// Encode one line's bytes as a separator-free token
pub fn encode_line(line: &[u8]) -> String {
    STANDARD.encode(line)
}

/// Decode a token produced by [`encode_line`]
///
/// # Errors
///
/// Returns [`QweError::Decode`] if the token is not valid base64.
pub fn decode_line(token: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(token)
        .map_err(|e| QweError::Decode(format!("'{}': {}", token, e)))
}

/// Classify a sample of content
///
/// Content is binary when a NUL byte appears within the first `sample_size`
/// bytes. NUL is neither printable nor whitespace, so this is the only byte
/// that flips the classification.
pub fn classify_bytes(content: &[u8], sample_size: usize) -> FileKind {
    let check_len = content.len().min(sample_size);
    if content[..check_len].contains(&0) {
        FileKind::Binary
    } else {
        FileKind::Text
    }
}

/// Classify a file on disk by sampling its head
pub fn classify(path: &Path, sample_size: usize) -> Result<FileKind> {
    let mut sample = Vec::with_capacity(sample_size);
    File::open(path)?
        .take(sample_size as u64)
        .read_to_end(&mut sample)?;

    let kind = classify_bytes(&sample, sample_size);
    debug!("Classified {:?} as {:?} ({} bytes sampled)", path, kind, sample.len());
    Ok(kind)
}
