//! Object store and repository layout
//!
//! `Storage` owns the on-disk repository directory and every byte written
//! into it. All blobs are compressed at rest; reads decompress into memory
//! only, so nothing on disk is ever left in decompressed form, even when an
//! operation fails halfway.
//!
//! ## Layout
//!
//! ```text
//! <work_dir>/.qwe/
//! ├── metadata.json          # RepositoryMetadata (plain JSON)
//! ├── _tracker.qwe           # compressed TrackerSchema
//! ├── _group_tracker.qwe     # compressed GroupTrackerSchema
//! ├── LOCK                   # present while a mutating verb runs
//! └── _object/
//!     └── <ObjectId>         # compressed base, diff or binary snapshot
//! ```
//!
//! Objects are keyed by freshly minted ids rather than by content hash: two
//! commits with identical diffs still get two objects.

use crate::compression::{CompressionEngine, CompressionStats, CompressionStrategy};
use crate::error::{QweError, Result};
use crate::types::{ObjectId, ObjectKind, QweConfig, RepositoryMetadata};
use crate::utils;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// Directory holding object blobs
pub const OBJECTS_DIR: &str = "_object";

/// Metadata file name
pub const METADATA_FILE: &str = "metadata.json";

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;

/// Compressed object store for one repository
pub struct Storage {
    /// Repository directory (`<work_dir>/.qwe`)
    root: PathBuf,
    /// Compression engine shared by every read and write
    compression: Mutex<CompressionEngine>,
    /// Repository metadata and configuration
    metadata: RepositoryMetadata,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("root", &self.root)
            .field("strategy", &self.compression.lock().strategy())
            .finish()
    }
}

impl Storage {
    /// Create the repository directory structure
    ///
    /// # Errors
    ///
    /// - [`QweError::RepositoryAlreadyExists`] if `root` already exists
    /// - [`QweError::InvalidConfiguration`] for an unknown compression strategy
    /// - [`QweError::Io`] if the directories cannot be created
    pub fn init(root: PathBuf, config: QweConfig) -> Result<Self> {
        if root.exists() {
            return Err(QweError::RepositoryAlreadyExists(root));
        }
        let strategy: CompressionStrategy = config.compression_strategy.parse()?;

        fs::create_dir_all(root.join(OBJECTS_DIR))?;

        let metadata = RepositoryMetadata {
            format_version: FORMAT_VERSION,
            qwe_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            config,
        };
        let metadata_json = serde_json::to_string_pretty(&metadata)?;
        utils::atomic_write(&root.join(METADATA_FILE), metadata_json.as_bytes())?;

        info!("Initialized storage at {:?}", root);

        Ok(Self {
            root,
            compression: Mutex::new(CompressionEngine::new(strategy)),
            metadata,
        })
    }

    /// Open an existing repository directory
    ///
    /// # Errors
    ///
    /// - [`QweError::RepositoryNotInitialized`] if `root` has no metadata file
    /// - [`QweError::Json`] if the metadata cannot be parsed
    pub fn open(root: PathBuf) -> Result<Self> {
        let metadata_path = root.join(METADATA_FILE);
        let metadata_json = match fs::read_to_string(&metadata_path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(QweError::RepositoryNotInitialized(root));
            }
            Err(e) => return Err(e.into()),
        };
        let metadata: RepositoryMetadata = serde_json::from_str(&metadata_json)?;
        let strategy: CompressionStrategy = metadata.config.compression_strategy.parse()?;

        fs::create_dir_all(root.join(OBJECTS_DIR))?;
        debug!("Opened storage at {:?} (format v{})", root, metadata.format_version);

        Ok(Self {
            root,
            compression: Mutex::new(CompressionEngine::new(strategy)),
            metadata,
        })
    }

    /// Repository directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Repository metadata
    pub fn metadata(&self) -> &RepositoryMetadata {
        &self.metadata
    }

    /// Repository configuration
    pub fn config(&self) -> &QweConfig {
        &self.metadata.config
    }

    /// Snapshot of the compression statistics gathered so far
    pub fn compression_stats(&self) -> CompressionStats {
        self.compression.lock().stats().clone()
    }

    /// Mint a fresh id of `kind` that no stored object uses yet
    pub fn new_object_id(&self, kind: ObjectKind, seed: &str) -> Result<ObjectId> {
        loop {
            let id = ObjectId::new(kind, utils::mint_hash(seed))?;
            if !self.object_exists(&id) {
                return Ok(id);
            }
            trace!("Minted id {} already in use, retrying", id);
        }
    }

    /// Compress and store `content` under `id`, returning the stored size
    pub fn store_object(&self, id: &ObjectId, content: &[u8]) -> Result<u64> {
        let path = self.object_path(id);
        self.write_compressed(&path, content)?;
        let size = fs::metadata(&path)?.len();
        debug!("Stored object {} ({} -> {} bytes)", id, content.len(), size);
        Ok(size)
    }

    /// Load and decompress the object stored under `id`
    ///
    /// # Errors
    ///
    /// - [`QweError::ObjectNotFound`] if no such object exists
    /// - [`QweError::Decompression`] if the blob is corrupt
    pub fn load_object(&self, id: &ObjectId) -> Result<Vec<u8>> {
        match self.read_compressed(&self.object_path(id)) {
            Err(QweError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(QweError::ObjectNotFound(id.to_string()))
            }
            other => other,
        }
    }

    /// Check whether an object is present
    pub fn object_exists(&self, id: &ObjectId) -> bool {
        self.object_path(id).exists()
    }

    /// Remove an object; a missing object is not an error
    pub fn delete_object(&self, id: &ObjectId) -> Result<()> {
        if utils::remove_file_if_exists(&self.object_path(id))? {
            debug!("Deleted object {}", id);
        }
        Ok(())
    }

    /// Names of every stored object, sorted
    pub fn list_objects(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.root.join(OBJECTS_DIR))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Compress `content` and write it atomically to `path`
    pub fn write_compressed(&self, path: &Path, content: &[u8]) -> Result<()> {
        let framed = self.compression.lock().compress(content)?;
        utils::atomic_write(path, &framed)
    }

    /// Read `path` and decompress it in memory
    pub fn read_compressed(&self, path: &Path) -> Result<Vec<u8>> {
        let framed = fs::read(path)?;
        self.compression.lock().decompress(&framed)
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(id.to_string())
    }
}
