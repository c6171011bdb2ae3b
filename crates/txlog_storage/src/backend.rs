//! The byte store a log file lives in.

use crate::error::{StorageError, StorageResult};
use std::ops::Range;

/// One log file as a flat, append-only run of bytes.
///
/// A backend never looks inside the bytes. Headers, entry versions and
/// checksums belong to `txlog_core`, which reads through a buffered
/// channel and writes whole buffers with [`append`](Self::append).
///
/// Offsets are absolute: byte 0 is the first byte of the log header.
/// The only way to shrink a log is [`truncate`](Self::truncate), which
/// recovery uses to cut a torn tail before appending again.
///
/// Backends are `Send + Sync`; a reader and an inspection tool may hold
/// shared references to the same backend.
pub trait StorageBackend: Send + Sync {
    /// Reads exactly `len` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`] if any part of the range lies
    /// beyond [`size`](Self::size), or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it starts at.
    ///
    /// # Errors
    ///
    /// Returns an I/O error. Part of `data` may already be stored.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Hands buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    fn flush(&mut self) -> StorageResult<()>;

    /// Current length, which is also the offset of the next append.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    fn size(&self) -> StorageResult<u64>;

    /// Makes data and metadata durable.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    fn sync(&mut self) -> StorageResult<()>;

    /// Shrinks the store to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TruncateBeyondEnd`] if `new_size` exceeds
    /// the current size, or an I/O error.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Reads the whole store.
    ///
    /// # Errors
    ///
    /// Returns an I/O error.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        self.read_at(0, size as usize)
    }
}

/// Bounds-checks `offset..offset + len` against `size`.
pub(crate) fn checked_range(offset: u64, len: usize, size: u64) -> StorageResult<Range<usize>> {
    let end = offset.saturating_add(len as u64);
    if end > size {
        return Err(StorageError::ReadPastEnd { offset, len, size });
    }
    Ok(offset as usize..end as usize)
}
