//! Main repository implementation
//!
//! [`Repository`] is the entry point for every qwe verb. It owns the
//! [`Storage`] for `<work_dir>/.qwe` and resolves tracked file names
//! against the working directory.
//!
//! ## Overview
//!
//! Each verb is one load-mutate-save cycle over the tracker schema, run
//! under the repository lock:
//!
//! - [`track`](Repository::track) stores the base snapshot and creates the tracker
//! - [`commit`](Repository::commit) appends a diff (or binary snapshot) when the file changed
//! - [`revert`](Repository::revert), [`rebase`](Repository::rebase) and
//!   [`recover`](Repository::recover) rewrite the working file from history
//! - [`diff`](Repository::diff), [`commits`](Repository::commits) and
//!   [`current`](Repository::current) only read
//!
//! Group verbs live in [`crate::group`].
//!
//! Objects are always written before the tracker that references them. When
//! a verb fails after writing objects, those objects are removed again.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use qwe::{Repository, RevertTarget};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = Repository::init(PathBuf::from("./notes"))?;
//!
//! repo.track("todo.txt")?;
//! std::fs::write("./notes/todo.txt", "buy milk\n")?;
//! repo.commit("todo.txt", "first list")?;
//!
//! repo.revert("todo.txt", RevertTarget::Commit(0))?;
//! # Ok(())
//! # }
//! ```

use crate::binary;
use crate::codec::{self, FileKind};
use crate::compression::CompressionStrategy;
use crate::diff::{self, line_changes};
use crate::error::{QweError, Result};
use crate::lock::RepoLock;
use crate::reconstruct::{reconstruct, reconstruct_lines, Target};
use crate::storage::Storage;
use crate::tracker::{tracker_mut, GroupTrackerStore, TrackerStore};
use crate::types::*;
use crate::utils::{hash_name, now_timestamp, split_lines};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Repository directory created inside the working directory
pub const REPO_DIR: &str = ".qwe";

/// A qwe repository rooted at a working directory
pub struct Repository {
    /// Directory tracked file names are resolved against
    work_dir: PathBuf,
    /// Object store for `<work_dir>/.qwe`
    storage: Storage,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("work_dir", &self.work_dir)
            .field("storage", &self.storage)
            .finish()
    }
}

impl Repository {
    /// Initialize a repository in `work_dir` with default settings
    ///
    /// # Errors
    ///
    /// - [`QweError::FileNotFound`] if `work_dir` is not a directory
    /// - [`QweError::RepositoryAlreadyExists`] if `work_dir/.qwe` exists
    pub fn init(work_dir: PathBuf) -> Result<Self> {
        RepositoryBuilder::new().init(work_dir)
    }

    /// Open the repository in `work_dir`
    ///
    /// # Errors
    ///
    /// Returns [`QweError::RepositoryNotInitialized`] if there is none.
    #[instrument]
    pub fn open(work_dir: PathBuf) -> Result<Self> {
        let storage = Storage::open(work_dir.join(REPO_DIR))?;
        debug!("Opened repository in {:?}", work_dir);
        Ok(Self { work_dir, storage })
    }

    /// Builder for a repository with custom settings
    pub fn builder() -> RepositoryBuilder {
        RepositoryBuilder::new()
    }

    fn create(work_dir: PathBuf, config: QweConfig) -> Result<Self> {
        if !work_dir.is_dir() {
            return Err(QweError::FileNotFound(work_dir));
        }
        info!("Initializing repository in {:?}", work_dir);

        let storage = Storage::init(work_dir.join(REPO_DIR), config)?;
        TrackerStore::new(&storage).init()?;
        GroupTrackerStore::new(&storage).init()?;

        Ok(Self { work_dir, storage })
    }

    /// Working directory
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Repository directory (`<work_dir>/.qwe`)
    pub fn root(&self) -> &Path {
        self.storage.root()
    }

    /// Active configuration
    pub fn config(&self) -> &QweConfig {
        self.storage.config()
    }

    /// Underlying object store
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub(crate) fn trackers(&self) -> TrackerStore<'_> {
        TrackerStore::new(&self.storage)
    }

    pub(crate) fn group_trackers(&self) -> GroupTrackerStore<'_> {
        GroupTrackerStore::new(&self.storage)
    }

    /// Take the repository lock when the configuration asks for it
    pub(crate) fn lock(&self) -> Result<Option<RepoLock>> {
        if self.config().use_lock {
            RepoLock::acquire(self.root()).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Path of a tracked file on disk
    pub(crate) fn resolve(&self, file: &str) -> PathBuf {
        self.work_dir.join(file)
    }

    /// Run `f`, deleting every object it recorded if it fails
    pub(crate) fn with_new_objects<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<ObjectId>) -> Result<T>,
    {
        let mut created = Vec::new();
        let result = f(&mut created);
        if result.is_err() {
            for id in &created {
                if let Err(e) = self.storage.delete_object(id) {
                    warn!("Failed to remove object {} after error: {}", id, e);
                }
            }
        }
        result
    }

    /// Start tracking `file`
    ///
    /// The file is classified text or binary once, here; the classification
    /// never changes afterwards. Returns the base object id.
    ///
    /// # Errors
    ///
    /// - [`QweError::AlreadyTracked`] if the file has a tracker
    /// - [`QweError::FileNotFound`] if the file does not exist
    #[instrument(skip(self))]
    pub fn track(&self, file: &str) -> Result<ObjectId> {
        let _lock = self.lock()?;
        self.with_new_objects(|created| {
            self.trackers()
                .update(|schema| self.track_in(schema, file, created))
        })
    }

    pub(crate) fn track_in(
        &self,
        schema: &mut TrackerSchema,
        file: &str,
        created: &mut Vec<ObjectId>,
    ) -> Result<ObjectId> {
        let key = hash_name(file);
        if schema.contains_key(&key) {
            return Err(QweError::AlreadyTracked(file.to_string()));
        }

        let path = self.existing_file(file)?;
        let kind = match codec::classify(&path, self.config().binary_sample_size)? {
            FileKind::Text => ObjectKind::Base,
            FileKind::Binary => ObjectKind::BinarySnapshot,
        };

        let content = fs::read(&path)?;
        let base = self.storage.new_object_id(kind, file)?;
        self.storage.store_object(&base, &content)?;
        created.push(base.clone());

        schema.insert(key, Tracker::new(base.clone()));
        info!("Started tracking {} ({:?})", file, kind);
        Ok(base)
    }

    /// Record the working file as a new version
    ///
    /// Returns [`CommitOutcome::Unchanged`] without touching the history when
    /// the file matches its latest commit (same lines and same line count,
    /// or identical bytes for a binary file).
    ///
    /// # Errors
    ///
    /// - [`QweError::NotTracked`] if the file has no tracker
    /// - [`QweError::FileNotFound`] if the working file is missing
    #[instrument(skip(self))]
    pub fn commit(&self, file: &str, message: &str) -> Result<CommitOutcome> {
        let _lock = self.lock()?;
        self.with_new_objects(|created| {
            self.trackers()
                .update(|schema| self.commit_in(schema, file, message, created))
        })
    }

    pub(crate) fn commit_in(
        &self,
        schema: &mut TrackerSchema,
        file: &str,
        message: &str,
        created: &mut Vec<ObjectId>,
    ) -> Result<CommitOutcome> {
        let tracker = tracker_mut(schema, file)?;
        let path = self.existing_file(file)?;

        let (kind, payload) = if tracker.is_binary() {
            let last = reconstruct(&self.storage, tracker, Target::Latest)?;
            if binary::same_content(&last[..], File::open(&path)?)? {
                return Ok(unchanged(tracker));
            }
            (ObjectKind::BinarySnapshot, fs::read(&path)?)
        } else {
            let old = reconstruct_lines(&self.storage, tracker, Target::Latest)?;
            let new = split_lines(&fs::read(&path)?);
            let record = diff::compute(&old, &new);
            if record.is_noop(old.len()) {
                return Ok(unchanged(tracker));
            }
            debug!(
                "{} changed lines, {} -> {} lines",
                record.rows.len(),
                old.len(),
                new.len()
            );
            (ObjectKind::Diff, record.to_bytes())
        };

        let uid = self.storage.new_object_id(kind, file)?;
        self.storage.store_object(&uid, &payload)?;
        created.push(uid.clone());

        tracker.versions.push(VersionDetails {
            uid: uid.clone(),
            commit_message: message.to_string(),
            timestamp: now_timestamp(),
        });
        tracker.current = uid.clone();
        let index = tracker.versions.len() - 1;

        info!("Committed {} as version {}", file, index);
        Ok(CommitOutcome::Committed { uid, index })
    }

    /// Restore the working file to a commit and make it current
    ///
    /// Returns the id that is now current.
    ///
    /// # Errors
    ///
    /// - [`QweError::FileNotFound`] if the working file is missing (recover it first)
    /// - [`QweError::InvalidCommitIndex`] if the commit does not exist
    #[instrument(skip(self))]
    pub fn revert(&self, file: &str, target: RevertTarget) -> Result<ObjectId> {
        let _lock = self.lock()?;
        self.trackers()
            .update(|schema| self.revert_in(schema, file, target))
    }

    fn revert_in(
        &self,
        schema: &mut TrackerSchema,
        file: &str,
        target: RevertTarget,
    ) -> Result<ObjectId> {
        let tracker = tracker_mut(schema, file)?;
        let restore = self.plan_revert(tracker, file, target)?;
        restore.write()?;
        tracker.current = restore.uid.clone();

        info!("Reverted {} to {:?}", file, target);
        Ok(restore.uid)
    }

    /// Content a revert of `file` would write, computed without touching disk
    pub(crate) fn plan_revert(
        &self,
        tracker: &Tracker,
        file: &str,
        target: RevertTarget,
    ) -> Result<Restore> {
        let path = self.existing_file(file)?;

        let (replay, uid) = match target {
            RevertTarget::Latest => (Target::Latest, tracker.latest_id().clone()),
            RevertTarget::Commit(index) => {
                let version = tracker.versions.get(index).ok_or(QweError::InvalidCommitIndex {
                    index: index as i64,
                    available: tracker.versions.len(),
                })?;
                (Target::Commit(index), version.uid.clone())
            }
        };

        let content = reconstruct(&self.storage, tracker, replay)?;
        Ok(Restore { path, content, uid })
    }

    /// Restore the working file to its base snapshot
    ///
    /// No version is added or removed; only `current` moves to the base.
    #[instrument(skip(self))]
    pub fn rebase(&self, file: &str) -> Result<()> {
        let _lock = self.lock()?;
        self.trackers().update(|schema| self.rebase_in(schema, file))
    }

    fn rebase_in(&self, schema: &mut TrackerSchema, file: &str) -> Result<()> {
        let tracker = tracker_mut(schema, file)?;
        let restore = self.plan_rebase(tracker, file)?;
        restore.write()?;
        tracker.current = restore.uid;

        info!("Rebased {} to its base version", file);
        Ok(())
    }

    /// Base content of `file`; the working file may be missing
    pub(crate) fn plan_rebase(&self, tracker: &Tracker, file: &str) -> Result<Restore> {
        Ok(Restore {
            path: self.resolve(file),
            content: reconstruct(&self.storage, tracker, Target::BaseOnly)?,
            uid: tracker.base.clone(),
        })
    }

    /// Restore a deleted working file
    ///
    /// Text files come back at their latest commit, binary files at their
    /// current snapshot. The tracker is not modified.
    ///
    /// # Errors
    ///
    /// Returns [`QweError::FileAlreadyExists`] if the file is present.
    #[instrument(skip(self))]
    pub fn recover(&self, file: &str) -> Result<()> {
        let path = self.resolve(file);
        if path.exists() {
            return Err(QweError::FileAlreadyExists(path));
        }

        let tracker = self.trackers().get(file)?;
        let content = if tracker.is_binary() {
            self.storage.load_object(&tracker.current)?
        } else {
            reconstruct(&self.storage, &tracker, Target::Latest)?
        };
        write_working_file(&path, &content)?;

        info!("Recovered {}", file);
        Ok(())
    }

    /// Compare two states of a tracked file
    ///
    /// Nothing is written; both sides are materialized in memory.
    pub fn diff(&self, file: &str, target: DiffTarget) -> Result<DiffReport> {
        let tracker = self.trackers().get(file)?;

        let (older, newer) = match target {
            DiffTarget::WorkingVsLatest => (Target::Latest, None),
            DiffTarget::WorkingVsCommit(k) => (Target::Commit(k), None),
            DiffTarget::Commits(a, b) => (Target::Commit(a), Some(Target::Commit(b))),
        };

        if tracker.is_binary() {
            let old = reconstruct(&self.storage, &tracker, older)?;
            let same = match newer {
                Some(newer) => {
                    let new = reconstruct(&self.storage, &tracker, newer)?;
                    binary::same_content(&old[..], &new[..])?
                }
                None => binary::same_content(&old[..], File::open(self.existing_file(file)?)?)?,
            };
            return Ok(DiffReport::Binary { changed: !same });
        }

        let old = reconstruct_lines(&self.storage, &tracker, older)?;
        let new = match newer {
            Some(newer) => reconstruct_lines(&self.storage, &tracker, newer)?,
            None => split_lines(&fs::read(self.existing_file(file)?)?),
        };
        Ok(DiffReport::Text(line_changes(&old, &new)))
    }

    /// Commit history of `file`, oldest first
    pub fn commits(&self, file: &str) -> Result<Vec<VersionDetails>> {
        Ok(self.trackers().get(file)?.versions)
    }

    /// Version currently checked out for `file`
    pub fn current(&self, file: &str) -> Result<CurrentVersion> {
        let tracker = self.trackers().get(file)?;
        if tracker.current == tracker.base {
            return Ok(CurrentVersion::Base { uid: tracker.base });
        }

        let index = tracker.index_of(&tracker.current).ok_or_else(|| QweError::TrackerCorrupt {
            path: self.root().join(crate::tracker::TRACKER_FILE),
            reason: format!("current version {} of {} is not in its history", tracker.current, file),
        })?;
        Ok(CurrentVersion::Commit {
            index,
            details: tracker.versions[index].clone(),
        })
    }

    /// Raw tracker record for `file`
    pub fn tracker(&self, file: &str) -> Result<Tracker> {
        self.trackers().get(file)
    }

    /// Materialize `file` at `target` without touching the working file
    pub fn content_at(&self, file: &str, target: Target) -> Result<Vec<u8>> {
        let tracker = self.trackers().get(file)?;
        reconstruct(&self.storage, &tracker, target)
    }

    fn existing_file(&self, file: &str) -> Result<PathBuf> {
        let path = self.resolve(file);
        if path.is_file() {
            Ok(path)
        } else {
            Err(QweError::FileNotFound(path))
        }
    }
}

fn unchanged(tracker: &Tracker) -> CommitOutcome {
    debug!("No changes since version {:?}", tracker.latest_index());
    CommitOutcome::Unchanged {
        index: tracker.latest_index(),
        uid: tracker.latest_id().clone(),
    }
}

/// Working file content reconstructed ahead of the write
#[derive(Debug)]
pub(crate) struct Restore {
    pub(crate) path: PathBuf,
    pub(crate) content: Vec<u8>,
    /// Id the tracker's `current` moves to once the file is written
    pub(crate) uid: ObjectId,
}

impl Restore {
    pub(crate) fn write(&self) -> Result<()> {
        write_working_file(&self.path, &self.content)
    }
}

fn write_working_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, content)?;
    Ok(())
}

/// Builder for creating or opening a [`Repository`] with custom settings
///
/// # Default Values
///
/// - `compression_strategy`: `CompressionStrategy::Fast`
/// - `binary_sample_size`: 1024 bytes
/// - `use_lock`: true
#[derive(Debug, Clone)]
pub struct RepositoryBuilder {
    compression_strategy: CompressionStrategy,
    binary_sample_size: usize,
    use_lock: bool,
}

impl RepositoryBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        let defaults = QweConfig::default();
        Self {
            compression_strategy: CompressionStrategy::default(),
            binary_sample_size: defaults.binary_sample_size,
            use_lock: defaults.use_lock,
        }
    }

    /// Set compression strategy for stored objects
    pub fn compression_strategy(mut self, strategy: CompressionStrategy) -> Self {
        self.compression_strategy = strategy;
        self
    }

    /// Set how many leading bytes are sampled to detect binary files
    ///
    /// Values less than 1 are set to 1.
    pub fn binary_sample_size(mut self, size: usize) -> Self {
        self.binary_sample_size = size.max(1);
        self
    }

    /// Set whether mutating verbs take the repository lock file
    pub fn use_lock(mut self, use_lock: bool) -> Self {
        self.use_lock = use_lock;
        self
    }

    fn config(&self) -> QweConfig {
        QweConfig {
            compression_strategy: self.compression_strategy.as_str().to_string(),
            binary_sample_size: self.binary_sample_size,
            use_lock: self.use_lock,
            ..QweConfig::default()
        }
    }

    /// Initialize a new repository in `work_dir`
    pub fn init(self, work_dir: PathBuf) -> Result<Repository> {
        Repository::create(work_dir, self.config())
    }

    /// Open the repository in `work_dir`, initializing it with these
    /// settings if there is none yet
    ///
    /// An existing repository keeps the settings it was created with.
    pub fn open(self, work_dir: PathBuf) -> Result<Repository> {
        match Repository::open(work_dir.clone()) {
            Err(QweError::RepositoryNotInitialized(_)) => self.init(work_dir),
            other => other,
        }
    }
}

impl Default for RepositoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
