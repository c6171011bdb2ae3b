//! Error types for log reading and writing.

use crate::entry::LogEntryVersion;
use crate::types::LogPosition;
use std::io;
use thiserror::Error;

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors that can occur while encoding or decoding a transaction log.
#[derive(Debug, Error)]
pub enum LogError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] txlog_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is shorter than the header its format requires.
    ///
    /// A zero-length file is the usual pre-allocated, never-written case.
    #[error("incomplete log header: read {read} of {expected} bytes")]
    IncompleteHeader {
        /// Bytes actually available.
        read: usize,
        /// Bytes the header needs.
        expected: usize,
    },

    /// The header names a format this build cannot read.
    #[error("unsupported log header format version {format_version}")]
    UnsupportedLogFormat {
        /// Format byte found in the header.
        format_version: u8,
    },

    /// A version byte with no matching entry version.
    #[error(
        "unrecognized log entry version {version_code} (log header format {header_format}) at {position}"
    )]
    UnrecognizedVersion {
        /// The offending version byte.
        version_code: i8,
        /// Header format of the file, used to break ties on shared codes.
        header_format: u8,
        /// Start of the offending entry.
        position: LogPosition,
    },

    /// A type byte with no parser registered under the resolved version.
    #[error("unknown log entry type {type_code} for entry version {version_code} at {position}")]
    UnknownEntryType {
        /// The offending type byte.
        type_code: u8,
        /// Version byte the type was resolved under.
        version_code: i8,
        /// Start of the offending entry.
        position: LogPosition,
    },

    /// Reading ran off the end of the written data.
    ///
    /// This is how a torn tail shows up. Readers turn it into "no more
    /// entries"; it only escapes from raw channel reads.
    #[error("read past end of log at {position}")]
    ReadPastEnd {
        /// Position where the read started.
        position: LogPosition,
    },

    /// Transaction checksum did not match the bytes that were read.
    #[error(
        "transaction checksum mismatch at {position}: stored {expected:08x}, computed {actual:08x}"
    )]
    ChecksumMismatch {
        /// Checksum stored in the commit entry.
        expected: u32,
        /// Checksum computed over the transaction bytes.
        actual: u32,
        /// Position of the commit entry.
        position: LogPosition,
    },

    /// The entry kind does not exist in the target format generation.
    #[error("{entry} entries cannot be written in format {version}")]
    UnsupportedEntry {
        /// Entry kind name.
        entry: &'static str,
        /// Generation the writer targets.
        version: LogEntryVersion,
    },

    /// Entries arrived in an order a transaction cannot have.
    #[error("invalid entry sequence at {position}: {message}")]
    InvalidEntrySequence {
        /// What was wrong.
        message: String,
        /// Position of the out-of-place entry.
        position: LogPosition,
    },

    /// The entry body is structurally impossible.
    #[error("corrupted log entry at {position}: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
        /// Start of the offending entry.
        position: LogPosition,
    },

    /// A caller passed a value the format cannot represent.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },
}

impl LogError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>, position: LogPosition) -> Self {
        Self::Corrupted {
            message: message.into(),
            position,
        }
    }

    /// Creates an entry sequence error.
    pub fn invalid_sequence(message: impl Into<String>, position: LogPosition) -> Self {
        Self::InvalidEntrySequence {
            message: message.into(),
            position,
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns `true` for the end-of-written-data signal.
    #[must_use]
    pub fn is_past_end(&self) -> bool {
        matches!(self, Self::ReadPastEnd { .. })
    }

    /// Returns the log position the error refers to, if it has one.
    #[must_use]
    pub fn position(&self) -> Option<LogPosition> {
        match self {
            Self::UnrecognizedVersion { position, .. }
            | Self::UnknownEntryType { position, .. }
            | Self::ReadPastEnd { position }
            | Self::ChecksumMismatch { position, .. }
            | Self::InvalidEntrySequence { position, .. }
            | Self::Corrupted { position, .. } => Some(*position),
            _ => None,
        }
    }
}
