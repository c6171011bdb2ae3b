//! Log files on disk.

use crate::backend::{checked_range, StorageBackend};
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct OpenFile {
    file: File,
    size: u64,
}

/// A log file on the local file system.
///
/// The logical size is tracked next to the handle, so reads are checked
/// against what was appended through this backend. `flush` pushes data to
/// the OS; `sync` and `truncate` wait for the disk.
///
/// ```no_run
/// use txlog_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut log = FileBackend::open(Path::new("txlog.0")).unwrap();
/// log.append(b"entry bytes").unwrap();
/// log.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<OpenFile>,
}

impl FileBackend {
    fn from_options(path: &Path, options: &OpenOptions) -> StorageResult<Self> {
        let file = options.open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(OpenFile { file, size }),
        })
    }

    /// Opens the log at `path`, creating an empty one if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::from_options(
            path,
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false),
        )
    }

    /// Opens an existing log. Inspection tools use this so a mistyped
    /// path does not leave an empty file behind.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file does not exist.
    pub fn open_existing(path: &Path) -> StorageResult<Self> {
        Self::from_options(path, OpenOptions::new().read(true).write(true))
    }

    /// Like [`open`](Self::open), creating missing parent directories.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Path the log was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extends the file with `len` zero bytes, as log rotation does when
    /// it reserves space for the next file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    pub fn preallocate(&mut self, len: u64) -> StorageResult<()> {
        let inner = self.inner.get_mut();
        let new_size = inner.size + len;
        inner.file.set_len(new_size)?;
        inner.size = new_size;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        checked_range(offset, len, inner.size)?;
        let mut buf = vec![0u8; len];
        if len > 0 {
            inner.file.seek(SeekFrom::Start(offset))?;
            inner.file.read_exact(&mut buf)?;
        }
        Ok(buf)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let inner = self.inner.get_mut();
        let offset = inner.size;
        if !data.is_empty() {
            inner.file.seek(SeekFrom::Start(offset))?;
            inner.file.write_all(data)?;
            inner.size += data.len() as u64;
        }
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.get_mut().file.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.get_mut().file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let inner = self.inner.get_mut();
        if new_size > inner.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: inner.size,
            });
        }
        inner.file.set_len(new_size)?;
        inner.file.sync_all()?;
        inner.size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_an_empty_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("txlog.0");

        let log = FileBackend::open(&path).unwrap();
        assert_eq!(log.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(log.path(), path);
    }

    #[test]
    fn open_existing_leaves_no_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("txlog.9");

        assert!(matches!(
            FileBackend::open_existing(&path),
            Err(StorageError::Io(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("txlog.0");

        {
            let mut log = FileBackend::open(&path).unwrap();
            assert_eq!(log.append(&[7u8; 16]).unwrap(), 0);
            assert_eq!(log.append(b"start|commit").unwrap(), 16);
            log.sync().unwrap();
        }

        let log = FileBackend::open_existing(&path).unwrap();
        assert_eq!(log.size().unwrap(), 28);
        assert_eq!(log.read_at(16, 5).unwrap(), b"start");
        assert!(log.read_at(20, 9).is_err());
        assert!(log.read_at(3, 0).unwrap().is_empty());
    }

    #[test]
    fn preallocated_space_is_zero_and_appends_go_after_it() {
        let dir = tempdir().unwrap();
        let mut log = FileBackend::open(&dir.path().join("txlog.1")).unwrap();
        log.append(b"hdr").unwrap();
        log.preallocate(5).unwrap();

        assert_eq!(log.read_all().unwrap(), b"hdr\0\0\0\0\0");
        assert_eq!(log.append(b"x").unwrap(), 8);
    }

    #[test]
    fn truncate_cuts_a_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("txlog.0");

        let mut log = FileBackend::open(&path).unwrap();
        log.append(b"complete|torn").unwrap();
        log.truncate(8).unwrap();

        assert_eq!(log.size().unwrap(), 8);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);
        assert!(matches!(
            log.truncate(9),
            Err(StorageError::TruncateBeyondEnd { .. })
        ));
        assert_eq!(log.append(b"|next").unwrap(), 8);
    }

    #[test]
    fn nested_directories_are_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("graph").join("logs").join("txlog.0");

        let mut log = FileBackend::open_with_create_dirs(&path).unwrap();
        assert!(path.exists());
        log.flush().unwrap();
    }
}
