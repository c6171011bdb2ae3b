//! # txlog core
//!
//! Reading and writing of multi-generation transaction log files.
//!
//! This crate provides:
//! - The log file header codec
//! - Version dispatch and per-version entry parser tables
//! - An entry reader that tolerates torn tails and mixed generations
//! - An entry writer for any generation, with transaction checksums in
//!   the current one
//! - Plausibility checks, transaction grouping and a recovery scan
//!
//! ## Example
//!
//! ```rust
//! use txlog_core::{LogConfig, LogEntry, LogEntryReader, LogFile, LogHeader, StoreId};
//! use txlog_storage::InMemoryBackend;
//!
//! let config = LogConfig::default();
//! let header = LogHeader::current(0, 1, &StoreId::generate(0, 1));
//! let mut log = LogFile::create(Box::new(InMemoryBackend::new()), header, &config).unwrap();
//! log.writer().write_start_entry(1, 1, 0, 1, b"").unwrap();
//! log.writer().write_commit_entry(2, 0).unwrap();
//! let backend = log.into_backend().unwrap();
//!
//! let reader = LogEntryReader::open(backend.as_ref(), &config).unwrap();
//! let entries: Vec<LogEntry> = reader.collect::<Result<_, _>>().unwrap();
//! assert_eq!(entries.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
mod command;
mod config;
mod cursor;
pub mod entry;
mod error;
pub mod header;
mod log_file;
mod recovery;
mod sanity;
mod types;

pub use command::{
    CommandFormat, CommandReader, CommandReaderFactory, CommandWriter, StandardCommandReaders,
    StorageCommand, NONE_COMMAND,
};
pub use config::{LogConfig, DEFAULT_READ_BUFFER_SIZE};
pub use cursor::{CommittedTransaction, TransactionCursor};
pub use entry::{
    LogEntry, LogEntryCheckPoint, LogEntryCommand, LogEntryCommit, LogEntryReader, LogEntryStart,
    LogEntryVersion, LogEntryWriter,
};
pub use error::{LogError, LogResult};
pub use header::{read_log_header, write_log_header, LogHeader, CURRENT_LOG_FORMAT_VERSION};
pub use log_file::LogFile;
pub use recovery::{CorruptionReport, RecoveryReport, RecoveryScanner};
pub use sanity::{
    now_millis, SanityChecker, SanityReport, SanityWarning, UNREASONABLY_HIGH_SERVER_ID,
    UNREASONABLY_LONG_TIME_MILLIS,
};
pub use types::{LogPosition, StoreId, StoreIdProvider, BASE_TX_ID};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
