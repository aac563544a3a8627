//! Repository lock file
//!
//! Mutating verbs hold `<root>/LOCK` for their whole load-mutate-save cycle.
//! The file contains the owner's PID; a lock left behind by a dead process
//! is removed and acquisition retried.

use crate::error::{QweError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lock file name inside the repository directory
pub const LOCK_FILE: &str = "LOCK";

/// Attempts before giving up on a lock that keeps reappearing
const MAX_RETRIES: u32 = 2;

/// Guard for the repository lock; dropping it removes the lock file
#[derive(Debug)]
pub struct RepoLock {
    file: Option<File>,
    path: PathBuf,
}

impl RepoLock {
    /// Acquire the lock in `root`
    ///
    /// # Errors
    ///
    /// Returns [`QweError::RepositoryLocked`] if a live process holds it.
    pub fn acquire(root: &Path) -> Result<Self> {
        Self::acquire_with_retry(&root.join(LOCK_FILE), 0)
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn acquire_with_retry(path: &Path, attempt: u32) -> Result<Self> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                file.flush()?;
                debug!("Acquired repository lock {:?}", path);
                Ok(Self {
                    file: Some(file),
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Self::handle_existing(path, attempt),
            Err(e) => Err(e.into()),
        }
    }

    fn handle_existing(path: &Path, attempt: u32) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound && attempt < MAX_RETRIES => {
                return Self::acquire_with_retry(path, attempt + 1);
            }
            Err(e) => return Err(e.into()),
        };

        let pid = content.trim().parse::<u32>().ok();
        if let Some(pid) = pid {
            if is_process_alive(pid) || attempt >= MAX_RETRIES {
                return Err(QweError::RepositoryLocked {
                    pid,
                    path: path.to_path_buf(),
                });
            }
            warn!(pid = pid, "Removing stale repository lock");
        } else {
            if attempt >= MAX_RETRIES {
                return Err(QweError::RepositoryLocked {
                    pid: 0,
                    path: path.to_path_buf(),
                });
            }
            warn!("Lock file has invalid content, removing it");
        }

        if let Err(e) = fs::remove_file(path) {
            if e.kind() != ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        Self::acquire_with_retry(path, attempt + 1)
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        drop(self.file.take());
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}/stat", pid)).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
