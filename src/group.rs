//! Group verbs
//!
//! A group is a named set of tracked files with its own commit history.
//! Each group commit is a snapshot mapping every member file to the commit
//! it pointed at, so reverting the group reverts every member together.
//!
//! Group verbs update both tracker schemas. They load both up front, mutate
//! them in memory and save the file schema before the group schema; a
//! failure before the saves leaves both untouched on disk. Objects created
//! by a verb are removed on failure only while no saved tracker names them.

use crate::error::{QweError, Result};
use crate::repository::Repository;
use crate::tracker::tracker_mut;
use crate::types::*;
use crate::utils::hash_name;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

/// Group tracker for `name` inside a loaded schema
fn group_mut<'s>(schema: &'s mut GroupTrackerSchema, name: &str) -> Result<&'s mut GroupTracker> {
    schema
        .get_mut(&hash_name(name))
        .ok_or_else(|| QweError::InvalidGroup(name.to_string()))
}

impl Repository {
    /// Create an empty group
    ///
    /// The group starts with one snapshot, "Initial Tracking", holding no files.
    ///
    /// # Errors
    ///
    /// Returns [`QweError::GroupAlreadyExists`] if the name is taken.
    #[instrument(skip(self))]
    pub fn group_init(&self, name: &str) -> Result<ObjectId> {
        let _lock = self.lock()?;
        self.group_trackers().update(|schema| {
            let key = hash_name(name);
            if schema.contains_key(&key) {
                return Err(QweError::GroupAlreadyExists(name.to_string()));
            }
            let initial = self.storage().new_object_id(ObjectKind::Group, name)?;
            schema.insert(key, GroupTracker::new(name, initial.clone()));
            info!("Created group {}", name);
            Ok(initial)
        })
    }

    /// Add a file, or every file directly inside a directory, to a group
    ///
    /// Untracked files are tracked first. Each member is recorded in the
    /// group's current snapshot at its current commit (or as base-only).
    /// Returns the member names that were added.
    ///
    /// # Errors
    ///
    /// - [`QweError::InvalidGroup`] if the group does not exist
    /// - [`QweError::AlreadyInGroup`] if any file is already a member; nothing is added
    #[instrument(skip(self))]
    pub fn group_track(&self, group: &str, path: &str) -> Result<Vec<String>> {
        self.group_track_with(group, path, |groups| self.group_trackers().save(groups))
    }

    fn group_track_with<S>(&self, group: &str, path: &str, save_groups: S) -> Result<Vec<String>>
    where
        S: FnOnce(&GroupTrackerSchema) -> Result<()>,
    {
        let _lock = self.lock()?;

        let mut groups = self.group_trackers().load()?;
        let current = {
            let tracker = group_mut(&mut groups, group)?;
            tracker.current.clone()
        };

        let files = self.group_candidates(path)?;
        let snapshot = group_mut(&mut groups, group)?.current_snapshot()?;
        for file in &files {
            if snapshot.files.contains_key(&hash_name(file)) {
                return Err(QweError::AlreadyInGroup {
                    file: file.clone(),
                    group: group.to_string(),
                });
            }
        }

        self.with_new_objects(|created| {
            let mut schema = self.trackers().load()?;
            let mut members = BTreeMap::new();

            for file in &files {
                let key = hash_name(file);
                if !schema.contains_key(&key) {
                    self.track_in(&mut schema, file, created)?;
                }
                let file_tracker = tracker_mut(&mut schema, file)?;
                members.insert(
                    key,
                    FileDetails {
                        file_name: file.clone(),
                        commit_number: file_tracker.current_ref(),
                        file_obj_id: file_tracker.current.clone(),
                    },
                );
            }

            let tracker = group_mut(&mut groups, group)?;
            let snapshot = tracker.versions.get_mut(&current).ok_or_else(|| {
                QweError::internal(format!("group {} lost its current snapshot", group))
            })?;
            snapshot.files.extend(members);

            // Last fallible step: once this lands the new bases are referenced
            self.trackers().save(&schema)
        })?;
        save_groups(&groups)?;

        info!("Added {} files to group {}", files.len(), group);
        Ok(files)
    }

    /// Files named by `path`: the file itself, or the files directly inside a directory
    fn group_candidates(&self, path: &str) -> Result<Vec<String>> {
        let resolved = self.resolve(path);
        if !resolved.is_dir() {
            return Ok(vec![path.to_string()]);
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&resolved)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if entry.file_type().is_file() {
                let name = Path::new(path).join(entry.file_name());
                files.push(name.to_string_lossy().to_string());
            }
        }
        debug!("Found {} files in {:?}", files.len(), resolved);
        Ok(files)
    }

    /// Commit every member of a group and record a new group snapshot
    ///
    /// Members without changes keep their previous commit reference. If any
    /// member fails with a real error nothing is saved and the objects
    /// written by the attempt are removed.
    #[instrument(skip(self))]
    pub fn group_commit(&self, group: &str, message: &str) -> Result<GroupCommitOutcome> {
        let _lock = self.lock()?;

        let mut groups = self.group_trackers().load()?;
        let tracker = group_mut(&mut groups, group)?;
        let members = tracker.current_snapshot()?.files.clone();

        let (files, committed) = self.with_new_objects(|created| {
            let mut schema = self.trackers().load()?;
            let mut files = BTreeMap::new();
            let mut committed = 0;

            for (key, member) in members {
                let outcome = self.commit_in(&mut schema, &member.file_name, message, created)?;
                if !outcome.is_unchanged() {
                    committed += 1;
                }
                files.insert(
                    key,
                    FileDetails {
                        file_name: member.file_name,
                        commit_number: outcome.file_ref(),
                        file_obj_id: outcome.uid().clone(),
                    },
                );
            }

            self.trackers().save(&schema)?;
            Ok((files, committed))
        })?;

        let id = self.storage().new_object_id(ObjectKind::Group, group)?;
        let unchanged = files.len() - committed;
        tracker.versions.insert(
            id.clone(),
            GroupVersionDetails {
                commit_message: message.to_string(),
                files,
            },
        );
        tracker.version_order.push(id.clone());
        tracker.current = id.clone();
        let index = tracker.version_order.len() - 1;
        self.group_trackers().save(&groups)?;

        info!(
            "Committed group {} as version {} ({} changed, {} unchanged)",
            group, index, committed, unchanged
        );
        Ok(GroupCommitOutcome {
            id,
            index,
            committed,
            unchanged,
        })
    }

    /// Revert every member to the state recorded in group commit `index`
    ///
    /// Members recorded at a commit are reverted to it; base-only members
    /// are rebased. Every member is reconstructed before any working file is
    /// written, so a missing file or a damaged history fails the whole revert
    /// without touching the other members. The group's current commit moves
    /// only after every member succeeded.
    #[instrument(skip(self))]
    pub fn group_revert(&self, group: &str, index: usize) -> Result<ObjectId> {
        let _lock = self.lock()?;

        let mut groups = self.group_trackers().load()?;
        let tracker = group_mut(&mut groups, group)?;
        let id = tracker
            .version_order
            .get(index)
            .cloned()
            .ok_or(QweError::InvalidCommitIndex {
                index: index as i64,
                available: tracker.version_order.len(),
            })?;
        let snapshot = tracker.versions.get(&id).ok_or_else(|| {
            QweError::internal(format!("group {} has no snapshot for {}", group, id))
        })?;

        // Reconstruct every member before the first write
        let mut schema = self.trackers().load()?;
        let mut restores = Vec::with_capacity(snapshot.files.len());
        for member in snapshot.files.values() {
            let file = member.file_name.as_str();
            let file_tracker = tracker_mut(&mut schema, file)?;
            let restore = match member.commit_number {
                FileRef::Commit(k) => {
                    self.plan_revert(file_tracker, file, RevertTarget::Commit(k))?
                }
                FileRef::BaseOnly => self.plan_rebase(file_tracker, file)?,
            };
            restores.push((file, restore));
        }

        for (file, restore) in restores {
            if let Err(e) = restore.write() {
                // Members written so far keep trackers that match their files
                self.trackers().save(&schema)?;
                return Err(e);
            }
            debug!("Restored {} to {}", file, restore.uid);
            tracker_mut(&mut schema, file)?.current = restore.uid;
        }
        self.trackers().save(&schema)?;

        tracker.current = id.clone();
        self.group_trackers().save(&groups)?;

        info!("Reverted group {} to version {}", group, index);
        Ok(id)
    }

    /// Commit history of a group, oldest first
    pub fn group_commits(&self, group: &str) -> Result<Vec<GroupCommitSummary>> {
        let tracker = self.group_trackers().get(group)?;
        tracker
            .version_order
            .iter()
            .enumerate()
            .map(|(index, id)| {
                let details = tracker.versions.get(id).ok_or_else(|| {
                    QweError::internal(format!("group {} has no snapshot for {}", group, id))
                })?;
                Ok(GroupCommitSummary {
                    index,
                    id: id.clone(),
                    message: details.commit_message.clone(),
                    file_count: details.files.len(),
                })
            })
            .collect()
    }

    /// Group commit currently checked out
    pub fn group_current(&self, group: &str) -> Result<GroupStatus> {
        let tracker = self.group_trackers().get(group)?;
        let snapshot = tracker.current_snapshot()?;
        let index = tracker.index_of(&tracker.current).ok_or_else(|| {
            QweError::internal(format!("group {} current commit is not in its history", group))
        })?;

        Ok(GroupStatus {
            name: tracker.group_name.clone(),
            index,
            message: snapshot.commit_message.clone(),
            files: snapshot.files.values().cloned().collect(),
        })
    }

    /// Names of all groups, sorted
    pub fn groups(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .group_trackers()
            .load()?
            .into_values()
            .map(|g| g.group_name)
            .collect();
        names.sort();
        Ok(names)
    }
}
