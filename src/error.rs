//! Error types for the qwe library
//!
//! Every fallible operation in the crate returns [`Result<T>`], carrying a
//! [`QweError`] that names what went wrong. A commit that finds nothing to
//! record is not an error; it is reported through
//! [`CommitOutcome::Unchanged`](crate::types::CommitOutcome::Unchanged).

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the qwe library
pub type Result<T> = std::result::Result<T, QweError>;

/// Main error type for all qwe operations
#[derive(Debug, Error)]
pub enum QweError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory enumeration error from walkdir
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// File has no tracker entry
    #[error("File is not being tracked: {0}")]
    NotTracked(String),

    /// File already has a tracker entry
    #[error("File is already being tracked: {0}")]
    AlreadyTracked(String),

    /// Commit index outside the file's (or group's) history
    #[error("Invalid commit number {index} ({available} commits available)")]
    InvalidCommitIndex {
        /// Requested index
        index: i64,
        /// Number of commits that exist
        available: usize,
    },

    /// Group has no tracker entry
    #[error("Invalid group: {0}")]
    InvalidGroup(String),

    /// Group name is already registered
    #[error("Group is already being tracked: {0}")]
    GroupAlreadyExists(String),

    /// File is already a member of the group's current snapshot
    #[error("File {file} is already tracked in group {group}")]
    AlreadyInGroup {
        /// File path as given by the caller
        file: String,
        /// Group name
        group: String,
    },

    /// Recover target is present on disk
    #[error("File already exists: {0:?}")]
    FileAlreadyExists(PathBuf),

    /// Working file is missing
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),

    /// Object missing from the object store
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Decompression errors
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Persisted tracker schema could not be parsed
    #[error("Tracker corrupt ({path:?}): {reason}")]
    TrackerCorrupt {
        /// Tracker file that failed to parse
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Malformed line token inside a diff record
    #[error("Failed to decode line token: {0}")]
    Decode(String),

    /// Malformed diff record or a diff that does not fit its source
    #[error("Corrupt diff record {object}: {reason}")]
    CorruptDiff {
        /// Diff object id
        object: String,
        /// What was wrong with it
        reason: String,
    },

    /// No repository at the expected location
    #[error("No qwe repository found at {0:?}")]
    RepositoryNotInitialized(PathBuf),

    /// Repository directory already present
    #[error("Repository already initialized at {0:?}")]
    RepositoryAlreadyExists(PathBuf),

    /// Another process holds the repository lock
    #[error("Repository is locked by process {pid} ({path:?})")]
    RepositoryLocked {
        /// Process id recorded in the lock file
        pid: u32,
        /// Lock file path
        path: PathBuf,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QweError {
    /// Create a decompression error with a custom message
    pub fn decompression(msg: impl Into<String>) -> Self {
        QweError::Decompression(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        QweError::Internal(msg.into())
    }

    /// Create a corrupt-diff error for the given object
    pub fn corrupt_diff(object: impl Into<String>, reason: impl Into<String>) -> Self {
        QweError::CorruptDiff {
            object: object.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error indicates damaged repository data
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            QweError::TrackerCorrupt { .. }
                | QweError::CorruptDiff { .. }
                | QweError::Decode(_)
                | QweError::Decompression(_)
                | QweError::ObjectNotFound(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            QweError::NotTracked(path) => {
                format!("File '{}' is not being tracked. Run 'qwe track {}' first.", path, path)
            }
            QweError::FileNotFound(path) => {
                format!(
                    "File {:?} does not exist. If it was tracked, run 'qwe recover' to restore it first.",
                    path
                )
            }
            QweError::FileAlreadyExists(path) => {
                format!("File {:?} already exists. Only deleted files can be recovered.", path)
            }
            QweError::RepositoryNotInitialized(path) => {
                format!("No qwe repository found at {:?}. Run 'qwe init' first.", path)
            }
            QweError::RepositoryLocked { pid, path } => {
                format!(
                    "Repository is locked by process {}. If no qwe process is running, delete {:?}.",
                    pid, path
                )
            }
            _ => self.to_string(),
        }
    }
}
