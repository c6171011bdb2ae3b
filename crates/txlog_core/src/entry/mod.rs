//! Log entries and their per-generation codecs.
//!
//! A log file is a header followed by entries:
//!
//! ```text
//! [version byte (negative, 2.1+)][type byte][body]
//! ```
//!
//! [`LogEntryReader`] decodes any generation, resolving each entry's
//! version independently; [`LogEntryWriter`] produces the layout of one
//! chosen generation.

pub mod codes;
mod parsers;
mod reader;
mod registry;
mod version;
mod writer;

pub use parsers::ParseContext;
pub use reader::LogEntryReader;
pub use registry::{EntryParser, EntryParserSet, ParseFn};
pub use version::LogEntryVersion;
pub use writer::LogEntryWriter;

use crate::command::StorageCommand;
use crate::types::LogPosition;
use std::fmt;

/// Start of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntryStart {
    /// Generation the entry was read or will be written as.
    pub version: LogEntryVersion,
    /// Instance that started the transaction.
    pub master_id: i32,
    /// Instance that authored it.
    pub author_id: i32,
    /// Start time in epoch milliseconds.
    pub time_written: i64,
    /// Last committed transaction when this one began.
    pub last_committed_tx_when_started: i64,
    /// Opaque bytes attached by the transaction source.
    pub additional_header: Vec<u8>,
    /// Where the entry begins.
    pub start_position: LogPosition,
}

impl LogEntryStart {
    /// Compatibility checksum used by replication to identify a
    /// transaction.
    ///
    /// High word: `master_id * 37 + author_id`. Low word: the array hash
    /// of the additional header.
    #[must_use]
    pub fn checksum(&self) -> i64 {
        let ids = self.master_id.wrapping_mul(37).wrapping_add(self.author_id);
        (i64::from(ids) << 32) | i64::from(array_hash(&self.additional_header) as u32)
    }
}

/// `31 * h + b` over signed bytes, seeded with 1.
fn array_hash(bytes: &[u8]) -> i32 {
    bytes
        .iter()
        .fold(1i32, |h, b| h.wrapping_mul(31).wrapping_add(i32::from(*b as i8)))
}

/// One storage command inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntryCommand {
    /// Generation the entry was read or will be written as.
    pub version: LogEntryVersion,
    /// The command.
    pub command: StorageCommand,
}

/// End of a transaction. One- and two-phase commits decode to this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntryCommit {
    /// Generation the entry was read or will be written as.
    pub version: LogEntryVersion,
    /// Committed transaction id.
    pub tx_id: i64,
    /// Commit time in epoch milliseconds.
    pub time_written: i64,
}

/// A checkpoint: everything before `log_position` is in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntryCheckPoint {
    /// Generation the entry was read or will be written as.
    pub version: LogEntryVersion,
    /// Position recovery may start from.
    pub log_position: LogPosition,
}

/// A decoded log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// Transaction start.
    Start(LogEntryStart),
    /// Storage command.
    Command(LogEntryCommand),
    /// Transaction commit.
    Commit(LogEntryCommit),
    /// Checkpoint.
    CheckPoint(LogEntryCheckPoint),
    /// Legacy prepare marker; dropped by the reader.
    LegacyPrepare {
        /// Transaction identifier.
        identifier: i32,
        /// Prepare time in epoch milliseconds.
        time_written: i64,
    },
    /// Legacy done marker; dropped by the reader.
    LegacyDone {
        /// Transaction identifier.
        identifier: i32,
    },
    /// Zero-filled space; the reader treats it as end of data.
    Empty,
}

impl LogEntry {
    /// Short kind name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Command(_) => "command",
            Self::Commit(_) => "commit",
            Self::CheckPoint(_) => "checkpoint",
            Self::LegacyPrepare { .. } => "prepare",
            Self::LegacyDone { .. } => "done",
            Self::Empty => "empty",
        }
    }

    /// Generation of the entry, where it carries one.
    #[must_use]
    pub fn version(&self) -> Option<LogEntryVersion> {
        match self {
            Self::Start(e) => Some(e.version),
            Self::Command(e) => Some(e.version),
            Self::Commit(e) => Some(e.version),
            Self::CheckPoint(e) => Some(e.version),
            _ => None,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start(e) => write!(
                f,
                "Start[version={}, master={}, author={}, time={}, lastCommittedTxWhenStarted={}, additionalHeaderLength={}, position={}, checksum={}]",
                e.version,
                e.master_id,
                e.author_id,
                e.time_written,
                e.last_committed_tx_when_started,
                e.additional_header.len(),
                e.start_position,
                e.checksum()
            ),
            Self::Command(e) => write!(f, "{}", e.command),
            Self::Commit(e) => write!(
                f,
                "Commit[version={}, txId={}, time={}]",
                e.version, e.tx_id, e.time_written
            ),
            Self::CheckPoint(e) => write!(
                f,
                "CheckPoint[version={}, position={}]",
                e.version, e.log_position
            ),
            Self::LegacyPrepare {
                identifier,
                time_written,
            } => write!(f, "Prepare[identifier={identifier}, time={time_written}]"),
            Self::LegacyDone { identifier } => write!(f, "Done[identifier={identifier}]"),
            Self::Empty => f.write_str("Empty"),
        }
    }
}
