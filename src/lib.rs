//! # qwe - lightweight version control for single files
//!
//! A local, single-user version control engine that tracks individual files
//! and named groups of files, records line-level commits, and rebuilds any
//! tracked file at any point in its history.
//!
//! ## Overview
//!
//! qwe lets you:
//! - Track a file, capturing its original content as the base snapshot
//! - Commit changes as sparse line diffs (text) or full snapshots (binary)
//! - Revert a file to any commit, rebase it to its base, or recover it after deletion
//! - Diff the working file against a commit, or two commits against each other
//! - Group files and commit or revert them together
//!
//! It has no branches, no merging and no network transport.
//!
//! ## Architecture
//!
//! - **Object Store**: every base, diff and binary snapshot is an LZ4-compressed
//!   blob under `.qwe/_object/`, written atomically and only ever decompressed in memory
//! - **Diff records**: a header with the new line count plus one base64 row per
//!   changed position; a shrinking file is expressed by the header alone
//! - **Reconstruction**: base snapshot plus the ordered diff chain, replayed up to a commit
//! - **Trackers**: one compressed JSON schema for files and one for groups,
//!   rewritten as a whole by each operation under a lock file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use qwe::{DiffTarget, Repository, RevertTarget};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = Repository::init(PathBuf::from("./project"))?;
//!
//! repo.track("config.toml")?;
//! // ...edit config.toml...
//! let outcome = repo.commit("config.toml", "raise timeout")?;
//! println!("now at commit {:?}", outcome.index());
//!
//! let report = repo.diff("config.toml", DiffTarget::WorkingVsLatest)?;
//! println!("uncommitted changes: {}", report.has_changes());
//!
//! repo.revert("config.toml", RevertTarget::Commit(0))?;
//! repo.rebase("config.toml")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Groups
//!
//! ```rust,no_run
//! # use qwe::Repository;
//! # use std::path::PathBuf;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let repo = Repository::open(PathBuf::from("./project"))?;
//! repo.group_init("docs")?;
//! repo.group_track("docs", "docs")?; // every file directly inside ./docs
//! repo.group_commit("docs", "first draft")?;
//! repo.group_revert("docs", 0)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Limitations
//!
//! - Files are keyed by the path string given when they were tracked; no
//!   normalization is applied
//! - The lock file serializes mutating verbs, but a reader running while
//!   another process writes may see the older schema
//! - Line endings are normalized to `\n` in every reconstructed commit; only
//!   the base snapshot is kept byte-for-byte
//!
//! ## Module Organization
//!
//! - [`repository`]: [`Repository`] and the single-file verbs
//! - [`group`]: group verbs
//! - [`diff`]: diff records and the patch engine
//! - [`reconstruct`]: base + diff chain replay
//! - [`codec`]: line tokens and text/binary classification
//! - [`binary`]: snapshot comparison for binary files
//! - [`storage`]: compressed object store
//! - [`tracker`]: tracker schema persistence
//! - [`lock`]: repository lock file
//! - [`types`]: common types and data structures
//! - [`error`]: error types and handling

// Public API modules
pub mod binary;
pub mod codec;
pub mod compression;
pub mod diff;
pub mod error;
pub mod group;
pub mod lock;
pub mod reconstruct;
pub mod repository;
pub mod storage;
pub mod tracker;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use compression::{CompressionEngine, CompressionStrategy};
pub use diff::{DiffRecord, LineChange};
pub use error::{QweError, Result};
pub use reconstruct::Target;
pub use repository::{Repository, RepositoryBuilder};
pub use storage::Storage;
pub use types::*;
