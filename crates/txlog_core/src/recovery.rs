//! Tail scan of a single log file.
//!
//! The scan walks every committed transaction once, keeping only
//! counters and positions, and reports where the readable log ends. A
//! writer reopening the file truncates everything after that point.

use crate::config::LogConfig;
use crate::cursor::TransactionCursor;
use crate::entry::{LogEntry, LogEntryReader};
use crate::error::{LogError, LogResult};
use crate::header::LogHeader;
use crate::sanity::{now_millis, SanityChecker, SanityReport};
use crate::types::LogPosition;
use tracing::{info, warn};
use txlog_storage::StorageBackend;

/// Chunk size for scanning the unreadable tail.
const TAIL_CHUNK: usize = 64 * 1024;

/// Corruption that stopped a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptionReport {
    /// Where the bad entry starts, or the recoverable end if the error
    /// has no position.
    pub position: LogPosition,
    /// Error description.
    pub message: String,
}

/// What a scan found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// File header; `None` for a never-written file.
    pub header: Option<LogHeader>,
    /// Size of the file in bytes.
    pub file_size: u64,
    /// Number of complete transactions.
    pub committed_transactions: usize,
    /// Id of the first complete transaction.
    pub first_committed_tx_id: Option<i64>,
    /// Id of the last complete transaction.
    pub last_committed_tx_id: Option<i64>,
    /// Target of the last checkpoint entry.
    pub last_checkpoint: Option<LogPosition>,
    /// End of the last complete transaction or checkpoint.
    pub recoverable_end: LogPosition,
    /// Bytes after the recoverable end up to the last non-zero byte.
    /// Zero fill does not count.
    pub unreadable_bytes: u64,
    /// Corruption found when the scan does not fail on it.
    pub corruption: Option<CorruptionReport>,
    /// Implausible entries.
    pub sanity: SanityReport,
}

impl RecoveryReport {
    /// Whether the file holds nothing but complete transactions and
    /// zero fill.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.unreadable_bytes == 0 && self.corruption.is_none()
    }

    /// Whether bytes after the recoverable end must be cut before
    /// appending.
    #[must_use]
    pub fn needs_truncation(&self) -> bool {
        (self.recoverable_end.byte_offset as u64) < self.file_size
    }
}

/// Scans log files for their recoverable content.
#[derive(Debug, Clone)]
pub struct RecoveryScanner {
    config: LogConfig,
    sanity: SanityChecker,
    now_millis: i64,
}

impl RecoveryScanner {
    /// Creates a scanner judging start times against the current time.
    #[must_use]
    pub fn new(config: LogConfig) -> Self {
        let sanity = SanityChecker::from_config(&config);
        Self {
            config,
            sanity,
            now_millis: now_millis(),
        }
    }

    /// Judges start times against `now_millis` instead of the clock.
    #[must_use]
    pub fn at_time(mut self, now_millis: i64) -> Self {
        self.now_millis = now_millis;
        self
    }

    /// Scans `backend` with `config`.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn scan(backend: &dyn StorageBackend, config: &LogConfig) -> LogResult<RecoveryReport> {
        Self::new(config.clone()).run(backend)
    }

    /// Scans `backend`.
    ///
    /// # Errors
    ///
    /// Returns header and storage errors. Entry corruption is returned
    /// when `fail_on_corruption` is set and reported otherwise.
    pub fn run(&self, backend: &dyn StorageBackend) -> LogResult<RecoveryReport> {
        let reader = LogEntryReader::open(backend, &self.config)?;
        let header = reader.header().copied();
        let file_size = reader.data_size();
        let mut cursor = TransactionCursor::new(reader);

        let mut report = RecoveryReport {
            header,
            file_size,
            committed_transactions: 0,
            first_committed_tx_id: None,
            last_committed_tx_id: None,
            last_checkpoint: None,
            recoverable_end: cursor.recoverable_end(),
            unreadable_bytes: 0,
            corruption: None,
            sanity: SanityReport::new(),
        };

        loop {
            match cursor.next_transaction() {
                Ok(Some(transaction)) => {
                    let start = LogEntry::Start(transaction.start.clone());
                    self.sanity.check(
                        &start,
                        transaction.start.start_position,
                        self.now_millis,
                        &mut report.sanity,
                    );
                    let commit = LogEntry::Commit(transaction.commit);
                    self.sanity.check(
                        &commit,
                        transaction.commit_position,
                        self.now_millis,
                        &mut report.sanity,
                    );

                    report.committed_transactions += 1;
                    report.first_committed_tx_id.get_or_insert(transaction.tx_id());
                    report.last_committed_tx_id = Some(transaction.tx_id());
                }
                Ok(None) => break,
                Err(e) if self.config.fail_on_corruption || !is_corruption(&e) => return Err(e),
                Err(e) => {
                    let position = e.position().unwrap_or_else(|| cursor.recoverable_end());
                    warn!(%position, error = %e, "log corruption, stopping scan");
                    report.corruption = Some(CorruptionReport {
                        position,
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        report.last_checkpoint = cursor.last_checkpoint().map(|c| c.log_position);
        report.recoverable_end = cursor.recoverable_end();
        report.unreadable_bytes =
            unreadable_tail(backend, report.recoverable_end.byte_offset as u64, file_size)?;

        info!(
            transactions = report.committed_transactions,
            last_tx = ?report.last_committed_tx_id,
            end = %report.recoverable_end,
            unreadable = report.unreadable_bytes,
            "log scan complete"
        );
        if report.unreadable_bytes > 0 {
            warn!(
                "log has {} unreadable bytes after {}",
                report.unreadable_bytes, report.recoverable_end
            );
        }
        Ok(report)
    }
}

fn is_corruption(error: &LogError) -> bool {
    matches!(
        error,
        LogError::UnrecognizedVersion { .. }
            | LogError::UnknownEntryType { .. }
            | LogError::ChecksumMismatch { .. }
            | LogError::InvalidEntrySequence { .. }
            | LogError::Corrupted { .. }
    )
}

/// Counts bytes in `[from, size)` up to and including the last non-zero
/// byte.
fn unreadable_tail(backend: &dyn StorageBackend, from: u64, size: u64) -> LogResult<u64> {
    let mut last_non_zero = None;
    let mut offset = from;
    while offset < size {
        let len = std::cmp::min(TAIL_CHUNK as u64, size - offset) as usize;
        let chunk = backend.read_at(offset, len)?;
        if let Some(at) = chunk.iter().rposition(|b| *b != 0) {
            last_non_zero = Some(offset + at as u64);
        }
        offset += len as u64;
    }
    Ok(last_non_zero.map_or(0, |at| at + 1 - from))
}
