//! Log files held in memory.

use crate::backend::{checked_range, StorageBackend};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// A log file in a `Vec<u8>`.
///
/// Besides the [`StorageBackend`] operations it can be seeded with bytes,
/// padded with zeros like a pre-allocated file, and patched in place to
/// simulate bit rot. Nothing is ever durable; `flush` and `sync` succeed
/// without doing anything.
///
/// ```rust
/// use txlog_storage::{InMemoryBackend, StorageBackend};
///
/// let mut log = InMemoryBackend::new();
/// assert_eq!(log.append(b"header").unwrap(), 0);
/// log.preallocate(10);
/// assert_eq!(log.size().unwrap(), 16);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    bytes: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A log holding `bytes`, for example a hand-built or cut-off file.
    #[must_use]
    pub fn with_data(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }

    /// Copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }

    /// Pads the log with `len` zero bytes.
    pub fn preallocate(&mut self, len: usize) {
        let bytes = self.bytes.get_mut();
        bytes.resize(bytes.len() + len, 0);
    }

    /// Replaces stored bytes starting at `offset`. Test-only corruption;
    /// the log itself never rewrites data.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`] unless the whole range is
    /// already stored.
    pub fn overwrite_at(&mut self, offset: u64, patch: &[u8]) -> StorageResult<()> {
        let bytes = self.bytes.get_mut();
        let range = checked_range(offset, patch.len(), bytes.len() as u64)?;
        bytes[range].copy_from_slice(patch);
        Ok(())
    }

    /// Drops every stored byte.
    pub fn clear(&mut self) {
        self.bytes.get_mut().clear();
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let range = checked_range(offset, len, bytes.len() as u64)?;
        Ok(bytes[range].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let bytes = self.bytes.get_mut();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let bytes = self.bytes.get_mut();
        let size = bytes.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        bytes.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_report_entry_offsets() {
        let mut log = InMemoryBackend::new();
        assert_eq!(log.append(&[0u8; 16]).unwrap(), 0);
        assert_eq!(log.append(b"start").unwrap(), 16);
        assert_eq!(log.append(b"commit").unwrap(), 21);
        assert_eq!(log.size().unwrap(), 27);
        assert_eq!(log.read_at(16, 5).unwrap(), b"start");
        assert_eq!(log.read_all().unwrap().len(), 27);
    }

    #[test]
    fn reads_never_cross_the_end() {
        let log = InMemoryBackend::with_data(b"torn".to_vec());
        assert!(matches!(
            log.read_at(2, 3),
            Err(StorageError::ReadPastEnd { offset: 2, len: 3, size: 4 })
        ));
        assert!(log.read_at(9, 0).is_err());
        assert!(log.read_at(4, 0).unwrap().is_empty());
    }

    #[test]
    fn preallocated_tail_reads_as_zeros() {
        let mut log = InMemoryBackend::with_data(vec![0xFA, 1]);
        log.preallocate(3);
        assert_eq!(log.data(), [0xFA, 1, 0, 0, 0]);
        assert_eq!(log.read_at(2, 3).unwrap(), [0, 0, 0]);
    }

    #[test]
    fn overwrite_stays_inside_the_log() {
        let mut log = InMemoryBackend::with_data(b"abcdef".to_vec());
        log.overwrite_at(2, b"XY").unwrap();
        assert_eq!(log.data(), b"abXYef");
        assert!(log.overwrite_at(5, b"XY").is_err());
        assert_eq!(log.data(), b"abXYef");
    }

    #[test]
    fn truncate_cuts_a_torn_tail() {
        let mut log = InMemoryBackend::with_data(b"complete|torn".to_vec());
        log.truncate(8).unwrap();
        assert_eq!(log.data(), b"complete");
        assert!(matches!(
            log.truncate(100),
            Err(StorageError::TruncateBeyondEnd { requested: 100, size: 8 })
        ));
        log.clear();
        assert_eq!(log.size().unwrap(), 0);
    }
}
