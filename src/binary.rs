//! Binary path: full snapshots compared block by block
//!
//! Files classified binary when tracking started are never line-diffed.
//! Every commit stores the whole file as a `_bin_` object, and "diffing" two
//! versions only answers whether their bytes are equal.

use crate::error::{QweError, Result};
use crate::reconstruct::Target;
use crate::types::{ObjectId, Tracker};
use std::io::{self, Read};

/// Block size used when comparing two byte streams
pub const BINARY_CHUNK_SIZE: usize = 8192;

/// Read until `buf` is full or the reader is exhausted
fn fill_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Compare two streams in fixed-size blocks
///
/// Returns `true` when both streams yield the same bytes. Stops at the
/// first differing block or when both sides reach EOF together.
pub fn same_content<A: Read, B: Read>(mut a: A, mut b: B) -> Result<bool> {
    let mut block_a = vec![0u8; BINARY_CHUNK_SIZE];
    let mut block_b = vec![0u8; BINARY_CHUNK_SIZE];

    loop {
        let read_a = fill_block(&mut a, &mut block_a)?;
        let read_b = fill_block(&mut b, &mut block_b)?;

        if read_a != read_b || block_a[..read_a] != block_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// Snapshot object that holds `target` for a binary tracker
pub fn snapshot_id<'t>(tracker: &'t Tracker, target: Target) -> Result<&'t ObjectId> {
    match target {
        Target::BaseOnly => Ok(&tracker.base),
        Target::Latest => Ok(tracker.latest_id()),
        Target::Commit(index) => tracker
            .versions
            .get(index)
            .map(|v| &v.uid)
            .ok_or(QweError::InvalidCommitIndex {
                index: index as i64,
                available: tracker.versions.len(),
            }),
    }
}
