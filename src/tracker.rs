//! Persistent tracker stores
//!
//! The per-file history ([`TrackerSchema`]) and the group history
//! ([`GroupTrackerSchema`]) each live in one compressed JSON file that is
//! rewritten as a whole. Every operation loads the schema, mutates it and
//! saves it in one call through [`TrackerStore::update`] or
//! [`GroupTrackerStore::update`]; nothing holds a schema across operations.

use crate::error::{QweError, Result};
use crate::storage::Storage;
use crate::types::{GroupTracker, GroupTrackerSchema, Tracker, TrackerSchema};
use crate::utils::hash_name;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// File name of the per-file tracker schema
pub const TRACKER_FILE: &str = "_tracker.qwe";

/// File name of the group tracker schema
pub const GROUP_TRACKER_FILE: &str = "_group_tracker.qwe";

fn load_schema<T: DeserializeOwned>(storage: &Storage, path: &Path) -> Result<T> {
    let corrupt = |reason: String| QweError::TrackerCorrupt {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = match storage.read_compressed(path) {
        Ok(bytes) => bytes,
        Err(QweError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            return Err(corrupt("tracker file is missing".to_string()));
        }
        Err(QweError::Decompression(reason)) => return Err(corrupt(reason)),
        Err(e) => return Err(e),
    };

    let schema = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
    trace!("Loaded tracker schema from {:?}", path);
    Ok(schema)
}

fn save_schema<T: Serialize>(storage: &Storage, path: &Path, schema: &T) -> Result<()> {
    let json = serde_json::to_vec(schema)?;
    storage.write_compressed(path, &json)?;
    trace!("Saved tracker schema to {:?} ({} bytes)", path, json.len());
    Ok(())
}

/// Store for [`TrackerSchema`]
#[derive(Debug)]
pub struct TrackerStore<'a> {
    storage: &'a Storage,
    path: PathBuf,
}

impl<'a> TrackerStore<'a> {
    /// Store backed by `<root>/_tracker.qwe`
    pub fn new(storage: &'a Storage) -> Self {
        Self {
            path: storage.root().join(TRACKER_FILE),
            storage,
        }
    }

    /// Write an empty schema
    pub fn init(&self) -> Result<()> {
        save_schema(self.storage, &self.path, &TrackerSchema::new())
    }

    /// Load the whole schema
    pub fn load(&self) -> Result<TrackerSchema> {
        load_schema(self.storage, &self.path)
    }

    /// Replace the whole schema
    pub fn save(&self, schema: &TrackerSchema) -> Result<()> {
        save_schema(self.storage, &self.path, schema)
    }

    /// Load, apply `f` and save when `f` succeeds
    ///
    /// If `f` fails the schema on disk is left untouched.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TrackerSchema) -> Result<T>,
    {
        let mut schema = self.load()?;
        let result = f(&mut schema)?;
        self.save(&schema)?;
        Ok(result)
    }

    /// Tracker for `file`
    pub fn get(&self, file: &str) -> Result<Tracker> {
        let mut schema = self.load()?;
        schema
            .remove(&hash_name(file))
            .ok_or_else(|| QweError::NotTracked(file.to_string()))
    }
}

/// Look up a file's tracker in a loaded schema
pub fn tracker_mut<'s>(schema: &'s mut TrackerSchema, file: &str) -> Result<&'s mut Tracker> {
    schema
        .get_mut(&hash_name(file))
        .ok_or_else(|| QweError::NotTracked(file.to_string()))
}

/// Store for [`GroupTrackerSchema`]
#[derive(Debug)]
pub struct GroupTrackerStore<'a> {
    storage: &'a Storage,
    path: PathBuf,
}

impl<'a> GroupTrackerStore<'a> {
    /// Store backed by `<root>/_group_tracker.qwe`
    pub fn new(storage: &'a Storage) -> Self {
        Self {
            path: storage.root().join(GROUP_TRACKER_FILE),
            storage,
        }
    }

    /// Write an empty schema
    pub fn init(&self) -> Result<()> {
        save_schema(self.storage, &self.path, &GroupTrackerSchema::new())
    }

    /// Load the whole schema
    pub fn load(&self) -> Result<GroupTrackerSchema> {
        load_schema(self.storage, &self.path)
    }

    /// Replace the whole schema
    pub fn save(&self, schema: &GroupTrackerSchema) -> Result<()> {
        debug!("Saving {} group trackers", schema.len());
        save_schema(self.storage, &self.path, schema)
    }

    /// Load, apply `f` and save when `f` succeeds
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut GroupTrackerSchema) -> Result<T>,
    {
        let mut schema = self.load()?;
        let result = f(&mut schema)?;
        self.save(&schema)?;
        Ok(result)
    }

    /// Tracker for the group named `name`
    pub fn get(&self, name: &str) -> Result<GroupTracker> {
        let mut schema = self.load()?;
        schema
            .remove(&hash_name(name))
            .ok_or_else(|| QweError::InvalidGroup(name.to_string()))
    }
}
