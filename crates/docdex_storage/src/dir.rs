//! Environment directory layout and locking.
//!
//! ```text
//! <env_path>/
//! ├─ LOCK          # advisory lock, held while the environment is open
//! ├─ journal.log   # committed transactions
//! └─ journal.tmp   # compaction output before it replaces journal.log
//! ```

use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";
const COMPACTION_FILE: &str = "journal.tmp";

/// An exclusively locked environment directory.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct EnvironmentDir {
    path: PathBuf,
    _lock: File,
}

impl EnvironmentDir {
    /// Opens `path`, creating it when `create_if_missing` is set, and takes
    /// the exclusive lock.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the directory is missing and may not be created
    /// - `Locked` if another handle holds the directory
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(StorageError::NotFound {
                    path: path.display().to_string(),
                });
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(StorageError::NotFound {
                path: path.display().to_string(),
            });
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.display().to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    /// Root of the environment.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the live journal.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }

    /// Path compaction writes to before the rename.
    #[must_use]
    pub fn compaction_path(&self) -> PathBuf {
        self.path.join(COMPACTION_FILE)
    }
}
