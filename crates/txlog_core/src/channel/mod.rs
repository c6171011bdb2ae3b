//! Sequential byte channels over a storage backend.
//!
//! Entry parsers and writers never touch a [`StorageBackend`] directly.
//! They see a [`ReadableChannel`] or [`WritableChannel`]: a big-endian
//! cursor with a position marker and a running checksum. Reading past the
//! written data fails with [`LogError::ReadPastEnd`], which the entry
//! reader turns into a clean end of stream.
//!
//! [`StorageBackend`]: txlog_storage::StorageBackend
//! [`LogError::ReadPastEnd`]: crate::LogError::ReadPastEnd

mod read;
mod write;

pub use read::ReadLogChannel;
pub use write::WriteLogChannel;

use crate::error::LogResult;
use crate::types::LogPosition;

/// A readable, position-tracking byte stream.
pub trait ReadableChannel {
    /// Fills `buf` completely or fails with `ReadPastEnd` without
    /// consuming anything.
    fn read_exact(&mut self, buf: &mut [u8]) -> LogResult<()>;

    /// Reads `len` bytes into a fresh vector.
    ///
    /// Implementations must check the remaining length before
    /// allocating, so a corrupted length field cannot trigger a huge
    /// allocation.
    fn get_bytes(&mut self, len: usize) -> LogResult<Vec<u8>>;

    /// Position of the next byte to be read.
    fn position(&self) -> LogPosition;

    /// Starts a new checksum region at the current position.
    fn begin_checksum(&mut self);

    /// CRC32 of every byte read since the last [`begin_checksum`].
    ///
    /// [`begin_checksum`]: ReadableChannel::begin_checksum
    fn checksum(&self) -> u32;

    /// Reads one unsigned byte.
    fn get_u8(&mut self) -> LogResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads one signed byte.
    fn get_i8(&mut self) -> LogResult<i8> {
        Ok(self.get_u8()? as i8)
    }

    /// Reads a big-endian `u16`.
    fn get_u16(&mut self) -> LogResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Reads a big-endian `i32`.
    fn get_i32(&mut self) -> LogResult<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    /// Reads a big-endian `i64`.
    fn get_i64(&mut self) -> LogResult<i64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    /// Reads a big-endian IEEE-754 double.
    fn get_f64(&mut self) -> LogResult<f64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(f64::from_be_bytes(buf))
    }
}

/// An append-only, position-tracking byte sink.
pub trait WritableChannel {
    /// Appends raw bytes.
    fn put_bytes(&mut self, bytes: &[u8]) -> LogResult<()>;

    /// Position the next byte will be written at.
    fn position(&self) -> LogPosition;

    /// Starts a new checksum region at the current position.
    fn begin_checksum(&mut self);

    /// Writes the CRC32 of everything put since [`begin_checksum`] as a
    /// big-endian 4-byte value and returns it. The checksum bytes
    /// themselves are not part of the region.
    ///
    /// [`begin_checksum`]: WritableChannel::begin_checksum
    fn put_checksum(&mut self) -> LogResult<u32>;

    /// Pushes buffered bytes down to the backend.
    fn flush(&mut self) -> LogResult<()>;

    /// Appends one byte.
    fn put_u8(&mut self, value: u8) -> LogResult<()> {
        self.put_bytes(&[value])
    }

    /// Appends one signed byte.
    fn put_i8(&mut self, value: i8) -> LogResult<()> {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Appends a big-endian `u16`.
    fn put_u16(&mut self, value: u16) -> LogResult<()> {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Appends a big-endian `i32`.
    fn put_i32(&mut self, value: i32) -> LogResult<()> {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Appends a big-endian `i64`.
    fn put_i64(&mut self, value: i64) -> LogResult<()> {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Appends a big-endian IEEE-754 double.
    fn put_f64(&mut self, value: f64) -> LogResult<()> {
        self.put_bytes(&value.to_be_bytes())
    }
}
