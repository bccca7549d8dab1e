//! File-backed journal for persistent environments.

use crate::error::{StorageError, StorageResult};
use crate::journal::Journal;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A journal stored in a single file.
///
/// `sync` calls `File::sync_all`, so a synced commit survives power loss.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: Mutex<File>,
    len: u64,
}

impl FileJournal {
    /// Opens the journal at `path`, creating an empty one if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            len,
        })
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Journal for FileJournal {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if offset > self.len || end > self.len {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.len,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.len;
        if data.is_empty() {
            return Ok(offset);
        }
        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.len += data.len() as u64;
        Ok(offset)
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.len)
    }

    fn sync(&mut self) -> StorageResult<()> {
        let file = self.file.get_mut();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_len: u64) -> StorageResult<()> {
        if new_len > self.len {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot grow journal from {} to {new_len}", self.len),
            )));
        }
        let file = self.file.get_mut();
        file.set_len(new_len)?;
        file.sync_all()?;
        self.len = new_len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn contents_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");
        {
            let mut journal = FileJournal::open(&path).unwrap();
            journal.append(b"first").unwrap();
            journal.append(b"second").unwrap();
            journal.sync().unwrap();
        }
        let journal = FileJournal::open(&path).unwrap();
        assert_eq!(journal.len().unwrap(), 11);
        assert_eq!(journal.read_at(5, 6).unwrap(), b"second");
        assert_eq!(journal.path(), path);
    }

    #[test]
    fn truncate_then_append_overwrites_tail() {
        let dir = tempdir().unwrap();
        let mut journal = FileJournal::open(&dir.path().join("j")).unwrap();
        journal.append(b"keep-torn").unwrap();
        journal.truncate(4).unwrap();
        assert_eq!(journal.append(b"!").unwrap(), 4);
        assert_eq!(journal.read_at(0, 5).unwrap(), b"keep!");
    }

    #[test]
    fn empty_reads_and_appends() {
        let dir = tempdir().unwrap();
        let mut journal = FileJournal::open(&dir.path().join("j")).unwrap();
        assert_eq!(journal.append(b"").unwrap(), 0);
        assert!(journal.is_empty().unwrap());
        assert!(journal.read_at(0, 0).unwrap().is_empty());
        assert!(journal.read_at(0, 1).is_err());
    }
}
