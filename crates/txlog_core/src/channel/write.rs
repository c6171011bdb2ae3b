//! Buffered append channel over a storage backend.

use super::WritableChannel;
use crate::error::LogResult;
use crate::types::LogPosition;
use crc32fast::Hasher;
use txlog_storage::StorageBackend;

/// Default write buffer capacity.
const DEFAULT_CAPACITY: usize = 8 * 1024;

/// Appends log bytes to an owned backend.
///
/// Bytes are staged in memory and reach the backend on [`flush`], or
/// when the staging buffer fills up. Positions count staged bytes, so
/// they are valid as soon as an entry is written.
///
/// [`flush`]: WritableChannel::flush
pub struct WriteLogChannel {
    backend: Box<dyn StorageBackend>,
    log_version: i64,
    buffer: Vec<u8>,
    capacity: usize,
    backend_size: u64,
    hasher: Option<Hasher>,
    sync_on_flush: bool,
}

impl WriteLogChannel {
    /// Creates a channel appending after the backend's current content.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be read.
    pub fn new(backend: Box<dyn StorageBackend>, log_version: i64) -> LogResult<Self> {
        let backend_size = backend.size()?;
        Ok(Self {
            backend,
            log_version,
            buffer: Vec::with_capacity(DEFAULT_CAPACITY),
            capacity: DEFAULT_CAPACITY,
            backend_size,
            hasher: None,
            sync_on_flush: false,
        })
    }

    /// Sets whether every flush also syncs the backend.
    #[must_use]
    pub fn sync_on_flush(mut self, value: bool) -> Self {
        self.sync_on_flush = value;
        self
    }

    /// Sets the log version reported in positions.
    pub fn set_log_version(&mut self, log_version: i64) {
        self.log_version = log_version;
    }

    /// Read access to the backend. Staged bytes are not visible until
    /// flushed.
    #[must_use]
    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    /// Flushes and hands back the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn into_inner(mut self) -> LogResult<Box<dyn StorageBackend>> {
        self.flush()?;
        Ok(self.backend)
    }

    fn drain(&mut self) -> LogResult<()> {
        if !self.buffer.is_empty() {
            self.backend.append(&self.buffer)?;
            self.backend_size += self.buffer.len() as u64;
            self.buffer.clear();
        }
        Ok(())
    }
}

impl WritableChannel for WriteLogChannel {
    fn put_bytes(&mut self, bytes: &[u8]) -> LogResult<()> {
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(bytes);
        }
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() >= self.capacity {
            self.drain()?;
        }
        Ok(())
    }

    fn position(&self) -> LogPosition {
        LogPosition::new(
            self.log_version,
            (self.backend_size + self.buffer.len() as u64) as i64,
        )
    }

    fn begin_checksum(&mut self) {
        self.hasher = Some(Hasher::new());
    }

    fn put_checksum(&mut self) -> LogResult<u32> {
        let checksum = self.hasher.take().map_or(0, Hasher::finalize);
        self.put_bytes(&checksum.to_be_bytes())?;
        Ok(checksum)
    }

    fn flush(&mut self) -> LogResult<()> {
        self.drain()?;
        self.backend.flush()?;
        if self.sync_on_flush {
            self.backend.sync()?;
        }
        Ok(())
    }
}
