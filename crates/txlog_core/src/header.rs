//! Log file header codec.
//!
//! Every log file starts with a fixed header. The first 8-byte word packs
//! the header format into its top byte and the log version into the low
//! 56 bits:
//!
//! ```text
//! formats 2..=6 (16 bytes)        format 7 (64 bytes)
//! +---------------------------+   +---------------------------+
//! | format << 56 | logVersion |   | format << 56 | logVersion |
//! | lastCommittedTxId (i64)   |   | lastCommittedTxId (i64)   |
//! +---------------------------+   | StoreId (40 bytes)        |
//!                                 | reserved (8 zero bytes)   |
//!                                 +---------------------------+
//! ```

use crate::channel::WritableChannel;
use crate::error::{LogError, LogResult};
use crate::types::{LogPosition, StoreId, StoreIdProvider};
use std::fmt;
use tracing::debug;
use txlog_storage::StorageBackend;

/// Header format written by 1.9 stores.
pub const LOG_VERSION_1_9: u8 = 2;
/// Header format written by 2.0 stores.
pub const LOG_VERSION_2_0: u8 = 3;
/// Header format written by 2.1 stores.
pub const LOG_VERSION_2_1: u8 = 4;
/// Header format written by 2.2 stores.
pub const LOG_VERSION_2_2: u8 = 5;
/// Header format written by 2.3 and 3.x stores.
pub const LOG_VERSION_2_3: u8 = 6;
/// Header format carrying a store identity block.
pub const LOG_VERSION_4_0: u8 = 7;
/// Header format written for new files.
pub const CURRENT_LOG_FORMAT_VERSION: u8 = LOG_VERSION_4_0;

/// Size of headers in formats 2..=6.
pub const LEGACY_LOG_HEADER_SIZE: usize = 16;
/// Size of headers in format 7.
pub const CURRENT_LOG_HEADER_SIZE: usize = 64;

const LOG_VERSION_BITS: u32 = 56;
const LOG_VERSION_MASK: i64 = 0x00FF_FFFF_FFFF_FFFF;
const RESERVED_BYTES: usize = 8;

/// Packs a header format and log version into the header's first word.
#[must_use]
pub const fn encode_log_version(log_version: i64, format_version: u8) -> i64 {
    ((format_version as i64) << LOG_VERSION_BITS) | (log_version & LOG_VERSION_MASK)
}

/// Extracts the log version from a header word.
#[must_use]
pub const fn decode_log_version(encoded: i64) -> i64 {
    encoded & LOG_VERSION_MASK
}

/// Extracts the header format from a header word.
#[must_use]
pub const fn decode_log_format_version(encoded: i64) -> u8 {
    ((encoded >> LOG_VERSION_BITS) & 0xFF) as u8
}

/// Header size for a given format.
///
/// # Errors
///
/// Returns `UnsupportedLogFormat` for formats this build cannot read.
pub fn header_size_for_format(format_version: u8) -> LogResult<usize> {
    match format_version {
        LOG_VERSION_1_9..=LOG_VERSION_2_3 => Ok(LEGACY_LOG_HEADER_SIZE),
        LOG_VERSION_4_0 => Ok(CURRENT_LOG_HEADER_SIZE),
        _ => Err(LogError::UnsupportedLogFormat { format_version }),
    }
}

/// Decoded log file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    /// Header format; also selects the entry version for un-versioned
    /// entry bytes.
    pub format_version: u8,
    /// Sequence number of this file.
    pub log_version: i64,
    /// Last transaction committed before this file was started.
    pub last_committed_tx_id: i64,
    /// Store identity; present exactly in format 7 headers.
    pub store_id: Option<StoreId>,
}

impl LogHeader {
    /// Creates a header without store identity, for formats 2..=6.
    #[must_use]
    pub const fn new(format_version: u8, log_version: i64, last_committed_tx_id: i64) -> Self {
        Self {
            format_version,
            log_version,
            last_committed_tx_id,
            store_id: None,
        }
    }

    /// Creates a current-format header for the store `provider` names.
    #[must_use]
    pub fn current(
        log_version: i64,
        last_committed_tx_id: i64,
        provider: &dyn StoreIdProvider,
    ) -> Self {
        Self {
            format_version: CURRENT_LOG_FORMAT_VERSION,
            log_version,
            last_committed_tx_id,
            store_id: Some(provider.store_id()),
        }
    }

    /// Encoded size of this header.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedLogFormat` for an unknown format.
    pub fn size(&self) -> LogResult<usize> {
        header_size_for_format(self.format_version)
    }

    /// Position of the first entry after this header.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedLogFormat` for an unknown format.
    pub fn start_position(&self) -> LogResult<LogPosition> {
        Ok(LogPosition::new(self.log_version, self.size()? as i64))
    }

    /// Encodes the header.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedLogFormat` for an unknown format, and
    /// `InvalidArgument` if the log version does not fit in 56 bits or
    /// the store identity is missing (format 7) or present (older).
    pub fn encode(&self) -> LogResult<Vec<u8>> {
        let size = self.size()?;
        if self.log_version < 0 || self.log_version > LOG_VERSION_MASK {
            return Err(LogError::invalid_argument(format!(
                "log version {} does not fit in 56 bits",
                self.log_version
            )));
        }

        let mut out = Vec::with_capacity(size);
        out.extend_from_slice(
            &encode_log_version(self.log_version, self.format_version).to_be_bytes(),
        );
        out.extend_from_slice(&self.last_committed_tx_id.to_be_bytes());

        match (size, self.store_id) {
            (CURRENT_LOG_HEADER_SIZE, Some(store_id)) => {
                for field in [
                    store_id.creation_time,
                    store_id.random_id,
                    store_id.store_version,
                    store_id.upgrade_time,
                    store_id.upgrade_tx_id,
                ] {
                    out.extend_from_slice(&field.to_be_bytes());
                }
                out.extend_from_slice(&[0; RESERVED_BYTES]);
            }
            (CURRENT_LOG_HEADER_SIZE, None) => {
                return Err(LogError::invalid_argument(format!(
                    "header format {} requires a store id",
                    self.format_version
                )));
            }
            (_, Some(_)) => {
                return Err(LogError::invalid_argument(format!(
                    "header format {} cannot carry a store id",
                    self.format_version
                )));
            }
            (_, None) => {}
        }
        Ok(out)
    }

    /// Decodes a header from the start of `bytes`. Extra bytes after the
    /// header are ignored.
    ///
    /// # Errors
    ///
    /// - `IncompleteHeader` if `bytes` is shorter than the header, or if
    ///   the header area is all zeroes (pre-allocated, never written)
    /// - `UnsupportedLogFormat` for an unknown format byte
    pub fn decode(bytes: &[u8]) -> LogResult<Self> {
        if bytes.len() < LEGACY_LOG_HEADER_SIZE {
            return Err(LogError::IncompleteHeader {
                read: bytes.len(),
                expected: LEGACY_LOG_HEADER_SIZE,
            });
        }
        if bytes[..LEGACY_LOG_HEADER_SIZE].iter().all(|b| *b == 0) {
            return Err(LogError::IncompleteHeader {
                read: 0,
                expected: LEGACY_LOG_HEADER_SIZE,
            });
        }

        let word = be_i64(bytes, 0);
        let format_version = decode_log_format_version(word);
        let size = header_size_for_format(format_version)?;
        if bytes.len() < size {
            return Err(LogError::IncompleteHeader {
                read: bytes.len(),
                expected: size,
            });
        }

        let store_id = (size == CURRENT_LOG_HEADER_SIZE).then(|| StoreId {
            creation_time: be_i64(bytes, 16),
            random_id: be_i64(bytes, 24),
            store_version: be_i64(bytes, 32),
            upgrade_time: be_i64(bytes, 40),
            upgrade_tx_id: be_i64(bytes, 48),
        });

        Ok(Self {
            format_version,
            log_version: decode_log_version(word),
            last_committed_tx_id: be_i64(bytes, 8),
            store_id,
        })
    }
}

impl fmt::Display for LogHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogHeader{{formatVersion={}, logVersion={}, lastCommittedTxId={}",
            self.format_version, self.log_version, self.last_committed_tx_id
        )?;
        if let Some(store_id) = &self.store_id {
            write!(f, ", storeId={store_id}")?;
        }
        write!(f, "}}")
    }
}

fn be_i64(bytes: &[u8], at: usize) -> i64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    i64::from_be_bytes(word)
}

/// Reads the header at offset 0 of `backend`.
///
/// With `strict` off, a file too short to hold a header (or whose header
/// area is still zero-filled) yields `Ok(None)`: the file was created but
/// never written.
///
/// # Errors
///
/// Returns `IncompleteHeader` in strict mode, `UnsupportedLogFormat` for
/// an unknown format, or a storage error.
pub fn read_log_header(backend: &dyn StorageBackend, strict: bool) -> LogResult<Option<LogHeader>> {
    let size = backend.size()?;
    let len = std::cmp::min(size, CURRENT_LOG_HEADER_SIZE as u64) as usize;
    let bytes = backend.read_at(0, len)?;

    match LogHeader::decode(&bytes) {
        Ok(header) => Ok(Some(header)),
        Err(LogError::IncompleteHeader { read, expected }) if !strict => {
            debug!(read, expected, "log file has no complete header");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Writes `header` to `channel`.
///
/// # Errors
///
/// Returns the encoding error, or a channel error.
pub fn write_log_header(channel: &mut dyn WritableChannel, header: &LogHeader) -> LogResult<()> {
    channel.put_bytes(&header.encode()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlog_storage::InMemoryBackend;

    fn store_id() -> StoreId {
        StoreId {
            creation_time: 1_500_000_000_000,
            random_id: -42,
            store_version: 0x0F,
            upgrade_time: 1_500_000_000_001,
            upgrade_tx_id: 9,
        }
    }

    #[test]
    fn legacy_header_round_trip() {
        let header = LogHeader::new(LOG_VERSION_2_1, 7, 100);
        let bytes = header.encode().unwrap();
        assert_eq!(bytes.len(), LEGACY_LOG_HEADER_SIZE);
        assert_eq!(bytes[0], LOG_VERSION_2_1);
        assert_eq!(&bytes[1..8], &[0, 0, 0, 0, 0, 0, 7]);
        assert_eq!(LogHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn current_header_carries_store_id() {
        let header = LogHeader::current(3, 55, &store_id());
        let bytes = header.encode().unwrap();
        assert_eq!(bytes.len(), CURRENT_LOG_HEADER_SIZE);
        assert!(bytes[56..].iter().all(|b| *b == 0));

        let decoded = LogHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.store_id, Some(store_id()));
        assert_eq!(decoded.start_position().unwrap(), LogPosition::new(3, 64));
    }

    #[test]
    fn word_packs_format_and_version() {
        let word = encode_log_version(0x0012_3456_789A_BCDE, 6);
        assert_eq!(decode_log_format_version(word), 6);
        assert_eq!(decode_log_version(word), 0x0012_3456_789A_BCDE);
    }

    #[test]
    fn store_id_presence_must_match_format() {
        let missing = LogHeader::new(CURRENT_LOG_FORMAT_VERSION, 0, 1);
        assert!(matches!(
            missing.encode(),
            Err(LogError::InvalidArgument { .. })
        ));

        let mut extra = LogHeader::new(LOG_VERSION_2_3, 0, 1);
        extra.store_id = Some(store_id());
        assert!(matches!(extra.encode(), Err(LogError::InvalidArgument { .. })));
    }

    #[test]
    fn oversized_log_version_rejected() {
        let header = LogHeader::new(LOG_VERSION_2_2, LOG_VERSION_MASK + 1, 1);
        assert!(matches!(header.encode(), Err(LogError::InvalidArgument { .. })));
    }

    #[test]
    fn unknown_formats_rejected() {
        for format in [1u8, 8, 0xFF] {
            let mut bytes = vec![0u8; CURRENT_LOG_HEADER_SIZE];
            bytes[0] = format;
            bytes[15] = 1;
            assert!(matches!(
                LogHeader::decode(&bytes),
                Err(LogError::UnsupportedLogFormat { format_version }) if format_version == format
            ));
        }
    }

    #[test]
    fn short_current_header_is_incomplete() {
        let bytes = LogHeader::current(0, 1, &store_id()).encode().unwrap();
        assert!(matches!(
            LogHeader::decode(&bytes[..40]),
            Err(LogError::IncompleteHeader {
                read: 40,
                expected: CURRENT_LOG_HEADER_SIZE
            })
        ));
    }

    #[test]
    fn empty_file_tolerated_unless_strict() {
        let backend = InMemoryBackend::new();
        assert_eq!(read_log_header(&backend, false).unwrap(), None);
        assert!(matches!(
            read_log_header(&backend, true),
            Err(LogError::IncompleteHeader { read: 0, .. })
        ));
    }

    #[test]
    fn zero_filled_file_has_no_header() {
        let mut backend = InMemoryBackend::new();
        backend.preallocate(1024);
        assert_eq!(read_log_header(&backend, false).unwrap(), None);
    }

    #[test]
    fn reads_header_followed_by_entries() {
        let mut bytes = LogHeader::new(LOG_VERSION_2_0, 2, 30).encode().unwrap();
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        let backend = InMemoryBackend::with_data(bytes);
        let header = read_log_header(&backend, true).unwrap().unwrap();
        assert_eq!(header, LogHeader::new(LOG_VERSION_2_0, 2, 30));
        assert_eq!(
            header.to_string(),
            "LogHeader{formatVersion=3, logVersion=2, lastCommittedTxId=30}"
        );
    }
}
