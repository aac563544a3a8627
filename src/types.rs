//! Core data types used throughout the qwe library
//!
//! ## Overview
//!
//! - **Identifiers**: [`ObjectId`], [`ObjectKind`], [`FileRef`]
//! - **Per-file history**: [`VersionDetails`], [`Tracker`], [`TrackerSchema`]
//! - **Group history**: [`FileDetails`], [`GroupVersionDetails`], [`GroupTracker`], [`GroupTrackerSchema`]
//! - **Configuration**: [`QweConfig`], [`RepositoryMetadata`]
//! - **Operation results**: [`CommitOutcome`], [`CurrentVersion`], [`DiffReport`] and the group summaries
//!
//! The persisted JSON keeps the classic string/integer encodings (`_base_`
//! prefixes, `-2` commit numbers) while the in-memory types are tagged enums.

use crate::diff::LineChange;
use crate::error::{QweError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const BASE_PREFIX: &str = "_base_";
const BINARY_PREFIX: &str = "_bin_";
const GROUP_PREFIX: &str = "_group_";

/// Commit number persisted for [`FileRef::BaseOnly`]
const BASE_ONLY_COMMIT_NUMBER: i64 = -2;

/// What an object in the store holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    /// Initial snapshot of a text file
    Base,
    /// Sparse line diff of one text commit
    Diff,
    /// Full snapshot of a binary file (base or commit)
    BinarySnapshot,
    /// Group commit identifier (never stored as a blob)
    Group,
}

impl ObjectKind {
    fn prefix(&self) -> &'static str {
        match self {
            ObjectKind::Base => BASE_PREFIX,
            ObjectKind::Diff => "",
            ObjectKind::BinarySnapshot => BINARY_PREFIX,
            ObjectKind::Group => GROUP_PREFIX,
        }
    }
}

/// Key into the object store
///
/// The kind is carried next to the hash; the prefixed string form
/// (`_base_<hash>`, `_bin_<hash>`, `_group_<hash>` or a bare `<hash>`) is
/// only used for file names and serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId {
    kind: ObjectKind,
    hash: String,
}

impl ObjectId {
    /// Build an id from a kind and a hex hash
    pub fn new(kind: ObjectKind, hash: impl Into<String>) -> Result<Self> {
        let hash = hash.into();
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(QweError::internal(format!("invalid object hash '{}'", hash)));
        }
        Ok(Self { kind, hash })
    }

    /// Kind of object this id names
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Hash part without the prefix
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// First 8 characters of the hash for display
    pub fn short(&self) -> &str {
        &self.hash[..self.hash.len().min(8)]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.hash)
    }
}

impl FromStr for ObjectId {
    type Err = QweError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, hash) = if let Some(rest) = s.strip_prefix(BASE_PREFIX) {
            (ObjectKind::Base, rest)
        } else if let Some(rest) = s.strip_prefix(BINARY_PREFIX) {
            (ObjectKind::BinarySnapshot, rest)
        } else if let Some(rest) = s.strip_prefix(GROUP_PREFIX) {
            (ObjectKind::Group, rest)
        } else {
            (ObjectKind::Diff, s)
        };
        ObjectId::new(kind, hash)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = QweError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.to_string()
    }
}

/// Reference from a group snapshot to one member file's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum FileRef {
    /// File had no commits; reverting means rebasing to its base
    BaseOnly,
    /// Zero-based commit index in the file's history
    Commit(usize),
}

impl TryFrom<i64> for FileRef {
    type Error = QweError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            BASE_ONLY_COMMIT_NUMBER => Ok(FileRef::BaseOnly),
            n if n >= 0 => Ok(FileRef::Commit(n as usize)),
            n => Err(QweError::internal(format!("invalid commit number {} in group tracker", n))),
        }
    }
}

impl From<FileRef> for i64 {
    fn from(value: FileRef) -> Self {
        match value {
            FileRef::BaseOnly => BASE_ONLY_COMMIT_NUMBER,
            FileRef::Commit(n) => n as i64,
        }
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileRef::BaseOnly => write!(f, "base"),
            FileRef::Commit(n) => write!(f, "{}", n),
        }
    }
}

/// One commit in a file's history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDetails {
    /// Object holding this commit's diff (or binary snapshot)
    pub uid: ObjectId,
    /// User-provided message
    pub commit_message: String,
    /// Creation time (RFC 3339)
    #[serde(alias = "time_stamp")]
    pub timestamp: String,
}

/// Version history of a single tracked file
///
/// `versions` is append-only; a position in it is the commit number.
/// `current` is either `base` or the `uid` of one of the versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracker {
    /// Snapshot captured when tracking started
    pub base: ObjectId,
    /// Version presently materialized in the working file
    pub current: ObjectId,
    /// Ordered commit history
    #[serde(default)]
    pub versions: Vec<VersionDetails>,
}

impl Tracker {
    /// Fresh tracker with no commits
    pub fn new(base: ObjectId) -> Self {
        Self {
            current: base.clone(),
            base,
            versions: Vec::new(),
        }
    }

    /// Whether the file was classified binary at tracking time
    pub fn is_binary(&self) -> bool {
        self.base.kind() == ObjectKind::BinarySnapshot
    }

    /// Index of the most recent commit
    pub fn latest_index(&self) -> Option<usize> {
        self.versions.len().checked_sub(1)
    }

    /// Id of the most recent commit, or the base when there are none
    pub fn latest_id(&self) -> &ObjectId {
        self.versions.last().map(|v| &v.uid).unwrap_or(&self.base)
    }

    /// Position of `uid` in the history
    pub fn index_of(&self, uid: &ObjectId) -> Option<usize> {
        self.versions.iter().position(|v| &v.uid == uid)
    }

    /// Reference to the currently checked-out state
    pub fn current_ref(&self) -> FileRef {
        match self.index_of(&self.current) {
            Some(index) => FileRef::Commit(index),
            None => FileRef::BaseOnly,
        }
    }
}

/// Persisted map from `hash(file_path)` to its tracker
pub type TrackerSchema = BTreeMap<String, Tracker>;

/// Member file reference inside a group snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDetails {
    /// File path as given when it joined the group
    pub file_name: String,
    /// Commit the snapshot points at
    pub commit_number: FileRef,
    /// Object id of that commit (or the base)
    pub file_obj_id: ObjectId,
}

/// Snapshot of every member file at one group commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionDetails {
    /// Group commit message
    pub commit_message: String,
    /// Member files keyed by `hash(file_path)`
    #[serde(default)]
    pub files: BTreeMap<String, FileDetails>,
}

/// Commit history of a named group of files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTracker {
    /// Display name of the group
    pub group_name: String,
    /// Group commit presently checked out
    pub current: ObjectId,
    /// Group commit ids in commit order
    pub version_order: Vec<ObjectId>,
    /// Group commits keyed by id
    pub versions: BTreeMap<ObjectId, GroupVersionDetails>,
}

impl GroupTracker {
    /// Group with a single empty "Initial Tracking" snapshot
    pub fn new(group_name: impl Into<String>, initial: ObjectId) -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(
            initial.clone(),
            GroupVersionDetails {
                commit_message: "Initial Tracking".to_string(),
                files: BTreeMap::new(),
            },
        );
        Self {
            group_name: group_name.into(),
            current: initial.clone(),
            version_order: vec![initial],
            versions,
        }
    }

    /// Snapshot of the current group commit
    pub fn current_snapshot(&self) -> Result<&GroupVersionDetails> {
        self.versions.get(&self.current).ok_or_else(|| {
            QweError::internal(format!(
                "group '{}' has no snapshot for its current commit {}",
                self.group_name, self.current
            ))
        })
    }

    /// Position of `id` in the commit order
    pub fn index_of(&self, id: &ObjectId) -> Option<usize> {
        self.version_order.iter().position(|v| v == id)
    }
}

/// Persisted map from `hash(group_name)` to its tracker
pub type GroupTrackerSchema = BTreeMap<String, GroupTracker>;

/// Configuration for a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QweConfig {
    /// Compression strategy name (`fast` or `none`)
    pub compression_strategy: String,
    /// Bytes sampled when classifying a file as text or binary
    pub binary_sample_size: usize,
    /// Whether mutating operations take the repository lock file
    pub use_lock: bool,
    /// qwe version that created this config
    pub version: String,
}

impl Default for QweConfig {
    fn default() -> Self {
        Self {
            compression_strategy: "fast".to_string(),
            binary_sample_size: 1024,
            use_lock: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Metadata stored alongside the repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    /// Version of the on-disk format
    pub format_version: u32,
    /// qwe version that created the repository
    pub qwe_version: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Configuration
    pub config: QweConfig,
}

/// Result of committing a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new version was appended
    Committed {
        /// Id of the new version's object
        uid: ObjectId,
        /// Its commit index
        index: usize,
    },
    /// Working file matches the last commit; nothing was recorded
    Unchanged {
        /// Last existing commit index, if any
        index: Option<usize>,
        /// Id of the last commit, or the base when there are none
        uid: ObjectId,
    },
}

impl CommitOutcome {
    /// Whether the commit was a no-op
    pub fn is_unchanged(&self) -> bool {
        matches!(self, CommitOutcome::Unchanged { .. })
    }

    /// Commit index the file now points at, if any
    pub fn index(&self) -> Option<usize> {
        match self {
            CommitOutcome::Committed { index, .. } => Some(*index),
            CommitOutcome::Unchanged { index, .. } => *index,
        }
    }

    /// Object id the file now points at
    pub fn uid(&self) -> &ObjectId {
        match self {
            CommitOutcome::Committed { uid, .. } | CommitOutcome::Unchanged { uid, .. } => uid,
        }
    }

    /// Reference suitable for a group snapshot
    pub fn file_ref(&self) -> FileRef {
        self.index().map(FileRef::Commit).unwrap_or(FileRef::BaseOnly)
    }
}

/// Which commit a revert should restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertTarget {
    /// Most recent commit
    Latest,
    /// Specific commit index
    Commit(usize),
}

impl RevertTarget {
    /// Convert a raw index where `-1` means latest
    pub fn from_index(index: i64, available: usize) -> Result<Self> {
        match index {
            -1 => Ok(RevertTarget::Latest),
            n if n >= 0 => Ok(RevertTarget::Commit(n as usize)),
            n => Err(QweError::InvalidCommitIndex { index: n, available }),
        }
    }
}

/// Checked-out state of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentVersion {
    /// Base snapshot is checked out
    Base {
        /// Base object id
        uid: ObjectId,
    },
    /// A commit is checked out
    Commit {
        /// Its index
        index: usize,
        /// Its details
        details: VersionDetails,
    },
}

/// What the `diff` verb compares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffTarget {
    /// Working file against the latest commit
    WorkingVsLatest,
    /// Working file against a given commit
    WorkingVsCommit(usize),
    /// Two commits against each other (older side first)
    Commits(usize, usize),
}

/// Result of the `diff` verb
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffReport {
    /// Positional line changes for a text file
    Text(Vec<LineChange>),
    /// Byte comparison for a binary file
    Binary {
        /// Whether the two sides differ
        changed: bool,
    },
}

impl DiffReport {
    /// Whether the two sides differ at all
    pub fn has_changes(&self) -> bool {
        match self {
            DiffReport::Text(changes) => !changes.is_empty(),
            DiffReport::Binary { changed } => *changed,
        }
    }
}

/// Result of committing a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCommitOutcome {
    /// New group commit id
    pub id: ObjectId,
    /// Its index in the group's history
    pub index: usize,
    /// Members that produced a new version
    pub committed: usize,
    /// Members that had no changes
    pub unchanged: usize,
}

/// One entry of a group's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCommitSummary {
    /// Index in the group's history
    pub index: usize,
    /// Group commit id
    pub id: ObjectId,
    /// Commit message
    pub message: String,
    /// Number of member files in the snapshot
    pub file_count: usize,
}

/// Checked-out state of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStatus {
    /// Group name
    pub name: String,
    /// Index of the current group commit
    pub index: usize,
    /// Its message
    pub message: String,
    /// Member files of the current snapshot
    pub files: Vec<FileDetails>,
}
