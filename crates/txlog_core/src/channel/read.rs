//! Buffered read channel over a storage backend.

use super::ReadableChannel;
use crate::error::{LogError, LogResult};
use crate::types::LogPosition;
use crc32fast::Hasher;
use txlog_storage::StorageBackend;

/// Reads a log file front to back through a read-ahead buffer.
///
/// The file size is captured when the channel is opened; bytes appended
/// afterwards are not visible. A read that would cross that end fails
/// with [`LogError::ReadPastEnd`] and leaves the position unchanged.
pub struct ReadLogChannel<'a> {
    backend: &'a dyn StorageBackend,
    log_version: i64,
    size: u64,
    offset: u64,
    buffer: Vec<u8>,
    buffer_start: u64,
    buffer_len: usize,
    hasher: Option<Hasher>,
}

impl<'a> ReadLogChannel<'a> {
    /// Opens a channel at offset 0 of `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be read.
    pub fn new(
        backend: &'a dyn StorageBackend,
        log_version: i64,
        buffer_size: usize,
    ) -> LogResult<Self> {
        let size = backend.size()?;
        Ok(Self {
            backend,
            log_version,
            size,
            offset: 0,
            buffer: vec![0; buffer_size.max(1)],
            buffer_start: 0,
            buffer_len: 0,
            hasher: None,
        })
    }

    /// Moves the read position, typically back to a marked entry start.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `offset` lies beyond the end.
    pub fn set_offset(&mut self, offset: u64) -> LogResult<()> {
        if offset > self.size {
            return Err(LogError::invalid_argument(format!(
                "offset {offset} is beyond log end {}",
                self.size
            )));
        }
        self.offset = offset;
        Ok(())
    }

    /// Current byte offset.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Sets the log version reported in positions.
    pub fn set_log_version(&mut self, log_version: i64) {
        self.log_version = log_version;
    }

    /// Size of the file as seen by this channel.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes left between the position and the end.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.size - self.offset
    }

    fn check_available(&self, len: usize) -> LogResult<()> {
        if (len as u64) > self.remaining() {
            return Err(LogError::ReadPastEnd {
                position: self.position(),
            });
        }
        Ok(())
    }

    fn is_buffered(&self, offset: u64) -> bool {
        offset >= self.buffer_start && offset < self.buffer_start + self.buffer_len as u64
    }

    fn refill(&mut self) -> LogResult<()> {
        let len = std::cmp::min(self.buffer.len() as u64, self.remaining()) as usize;
        let data = self.backend.read_at(self.offset, len)?;
        self.buffer[..data.len()].copy_from_slice(&data);
        self.buffer_start = self.offset;
        self.buffer_len = data.len();
        Ok(())
    }
}

impl ReadableChannel for ReadLogChannel<'_> {
    fn read_exact(&mut self, out: &mut [u8]) -> LogResult<()> {
        self.check_available(out.len())?;

        let mut written = 0;
        while written < out.len() {
            if !self.is_buffered(self.offset) {
                self.refill()?;
            }
            let at = (self.offset - self.buffer_start) as usize;
            let n = std::cmp::min(self.buffer_len - at, out.len() - written);
            out[written..written + n].copy_from_slice(&self.buffer[at..at + n]);
            written += n;
            self.offset += n as u64;
        }

        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(out);
        }
        Ok(())
    }

    fn get_bytes(&mut self, len: usize) -> LogResult<Vec<u8>> {
        self.check_available(len)?;
        let mut bytes = vec![0; len];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn position(&self) -> LogPosition {
        LogPosition::new(self.log_version, self.offset as i64)
    }

    fn begin_checksum(&mut self) {
        self.hasher = Some(Hasher::new());
    }

    fn checksum(&self) -> u32 {
        self.hasher
            .as_ref()
            .map_or(0, |hasher| hasher.clone().finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlog_storage::InMemoryBackend;

    fn backend(bytes: &[u8]) -> InMemoryBackend {
        InMemoryBackend::with_data(bytes.to_vec())
    }

    #[test]
    fn reads_big_endian_primitives() {
        let mut bytes = Vec::new();
        bytes.push(0xFA);
        bytes.extend_from_slice(&0x0102u16.to_be_bytes());
        bytes.extend_from_slice(&(-5i32).to_be_bytes());
        bytes.extend_from_slice(&1_234_567_890_123i64.to_be_bytes());
        bytes.extend_from_slice(&2.5f64.to_be_bytes());
        let backend = backend(&bytes);

        let mut channel = ReadLogChannel::new(&backend, 0, 64).unwrap();
        assert_eq!(channel.get_i8().unwrap(), -6);
        assert_eq!(channel.get_u16().unwrap(), 0x0102);
        assert_eq!(channel.get_i32().unwrap(), -5);
        assert_eq!(channel.get_i64().unwrap(), 1_234_567_890_123);
        assert_eq!(channel.get_f64().unwrap(), 2.5);
        assert_eq!(channel.remaining(), 0);
    }

    #[test]
    fn reads_across_buffer_refills() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let backend = backend(&bytes);

        // Tiny buffer forces a refill in the middle of most reads.
        let mut channel = ReadLogChannel::new(&backend, 0, 3).unwrap();
        let first = channel.get_bytes(7).unwrap();
        assert_eq!(first, bytes[..7]);
        let rest = channel.get_bytes(993).unwrap();
        assert_eq!(rest, bytes[7..]);
    }

    #[test]
    fn short_read_fails_without_consuming() {
        let backend = backend(&[0, 0, 0]);
        let mut channel = ReadLogChannel::new(&backend, 4, 16).unwrap();
        channel.get_u8().unwrap();

        let err = channel.get_i32().unwrap_err();
        assert!(err.is_past_end());
        assert_eq!(err.position(), Some(LogPosition::new(4, 1)));
        assert_eq!(channel.offset(), 1);
    }

    #[test]
    fn huge_length_is_rejected_before_allocation() {
        let backend = backend(&[1, 2, 3]);
        let mut channel = ReadLogChannel::new(&backend, 0, 16).unwrap();
        assert!(channel.get_bytes(usize::MAX / 2).unwrap_err().is_past_end());
    }

    #[test]
    fn rewind_rereads_the_same_bytes() {
        let backend = backend(&[9, 8, 7, 6]);
        let mut channel = ReadLogChannel::new(&backend, 0, 2).unwrap();
        assert_eq!(channel.get_bytes(3).unwrap(), vec![9, 8, 7]);
        channel.set_offset(1).unwrap();
        assert_eq!(channel.get_bytes(3).unwrap(), vec![8, 7, 6]);
        assert!(channel.set_offset(5).is_err());
    }

    #[test]
    fn checksum_covers_bytes_since_begin() {
        let backend = backend(b"skip-this|checked");
        let mut channel = ReadLogChannel::new(&backend, 0, 4).unwrap();
        assert_eq!(channel.checksum(), 0);

        channel.get_bytes(10).unwrap();
        channel.begin_checksum();
        channel.get_bytes(7).unwrap();
        assert_eq!(channel.checksum(), crc32fast::hash(b"checked"));
    }
}
