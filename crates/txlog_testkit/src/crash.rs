//! Crash and corruption simulation for log recovery tests.
//!
//! A crash while appending leaves a prefix of the intended bytes on disk,
//! possibly followed by pre-allocated zeros. Recovery must then find every
//! transaction that was completely written and nothing else.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use txlog_testkit::prelude::*;
//!
//! let log = LogBuilder::new(LogEntryVersion::V4_0).sample_transactions(3).build();
//! for cut in log.header_size as usize..=log.len() {
//!     let result = verify_torn_recovery(&log, cut);
//!     assert!(result.passed, "{result:?}");
//! }
//! ```

use crate::fixtures::{read_transactions, without_positions, TestLog};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use txlog_core::{CommittedTransaction, LogConfig, RecoveryScanner};
use txlog_storage::{StorageBackend, StorageError, StorageResult};

/// Result of a crash recovery check.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the check passed.
    pub passed: bool,
    /// Description of what was checked.
    pub description: String,
    /// Transactions that should survive.
    pub expected_transactions: usize,
    /// Transactions that did survive.
    pub actual_transactions: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, transactions: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_transactions: transactions,
            actual_transactions: transactions,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_transactions: expected,
            actual_transactions: actual,
            error: Some(error.to_string()),
        }
    }
}

/// Cuts `log` after `cut` bytes and checks that reading and scanning
/// both recover exactly the transactions that fit.
///
/// `cut` must not be inside the header.
pub fn verify_torn_recovery(log: &TestLog, cut: usize) -> CrashRecoveryResult {
    let description = format!("torn at {cut} of {} bytes", log.len());
    let expected = log.transactions_within(cut as u64);
    let torn = log.torn_at(cut);

    let actual = match read_transactions(&torn) {
        Ok(txs) => txs,
        Err(e) => return CrashRecoveryResult::fail(&description, expected.len(), 0, &e.to_string()),
    };
    if let Some(message) = compare(&expected, &actual) {
        return CrashRecoveryResult::fail(&description, expected.len(), actual.len(), &message);
    }

    let report = match RecoveryScanner::scan(&torn, &LogConfig::default()) {
        Ok(report) => report,
        Err(e) => {
            return CrashRecoveryResult::fail(
                &description,
                expected.len(),
                actual.len(),
                &e.to_string(),
            )
        }
    };
    let end = log.recoverable_end_within(cut as u64);
    if report.recoverable_end.byte_offset as u64 != end {
        return CrashRecoveryResult::fail(
            &description,
            expected.len(),
            actual.len(),
            &format!("recoverable end {} instead of {end}", report.recoverable_end),
        );
    }
    if report.committed_transactions != expected.len() {
        return CrashRecoveryResult::fail(
            &description,
            expected.len(),
            report.committed_transactions,
            "scan disagrees with reader",
        );
    }
    if (end as usize == cut) != (report.unreadable_bytes == 0) {
        return CrashRecoveryResult::fail(
            &description,
            expected.len(),
            actual.len(),
            &format!("{} unreadable bytes", report.unreadable_bytes),
        );
    }

    CrashRecoveryResult::pass(&description, expected.len())
}

fn compare(expected: &[CommittedTransaction], actual: &[CommittedTransaction]) -> Option<String> {
    if expected.len() != actual.len() {
        return Some(format!(
            "recovered {} transactions, expected {}",
            actual.len(),
            expected.len()
        ));
    }
    expected
        .iter()
        .zip(actual)
        .find(|(want, got)| **want != without_positions(got))
        .map(|(want, _)| format!("transaction {} differs", want.tx_id()))
}

/// Returns `bytes` with the byte at `offset` inverted.
pub fn flip_byte(bytes: &[u8], offset: usize) -> Vec<u8> {
    let mut bytes = bytes.to_vec();
    if let Some(b) = bytes.get_mut(offset) {
        *b = !*b;
    }
    bytes
}

/// Returns `bytes` followed by `len` zeros, as in a pre-allocated file.
pub fn zero_filled(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut bytes = bytes.to_vec();
    bytes.resize(bytes.len() + len, 0);
    bytes
}

/// Returns `bytes` followed by `garbage`.
pub fn with_garbage_tail(bytes: &[u8], garbage: &[u8]) -> Vec<u8> {
    let mut bytes = bytes.to_vec();
    bytes.extend_from_slice(garbage);
    bytes
}

/// A storage backend that dies after a set number of appended bytes.
///
/// The write that crosses the limit lands partially, like a torn write.
/// Every later append fails. The stored bytes stay reachable through a
/// [`CrashHandle`] after the backend has been moved into a writer.
pub struct CrashableBackend {
    data: Arc<RwLock<Vec<u8>>>,
    crashed: Arc<AtomicBool>,
    crash_after_bytes: usize,
    bytes_written: usize,
}

/// Shared view of a [`CrashableBackend`].
#[derive(Clone)]
pub struct CrashHandle {
    data: Arc<RwLock<Vec<u8>>>,
    crashed: Arc<AtomicBool>,
}

impl CrashHandle {
    /// Bytes that reached the backend.
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }
}

impl CrashableBackend {
    /// Creates an empty backend that crashes after `crash_after_bytes`.
    pub fn new(crash_after_bytes: usize) -> (Self, CrashHandle) {
        let data = Arc::new(RwLock::new(Vec::new()));
        let crashed = Arc::new(AtomicBool::new(false));
        let handle = CrashHandle {
            data: Arc::clone(&data),
            crashed: Arc::clone(&crashed),
        };
        let backend = Self {
            data,
            crashed,
            crash_after_bytes,
            bytes_written: 0,
        };
        (backend, handle)
    }

    fn crash(&self, what: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);
        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        if self.crashed.load(Ordering::SeqCst) {
            return Err(self.crash("write"));
        }
        let mut data = self.data.write();
        let offset = data.len() as u64;
        let room = self.crash_after_bytes.saturating_sub(self.bytes_written);
        if bytes.len() > room {
            data.extend_from_slice(&bytes[..room]);
            self.bytes_written += room;
            drop(data);
            return Err(self.crash("partial write"));
        }
        data.extend_from_slice(bytes);
        self.bytes_written += bytes.len();
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.crashed.load(Ordering::SeqCst) {
            return Err(self.crash("flush"));
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.crashed.load(Ordering::SeqCst) {
            return Err(self.crash("sync"));
        }
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample_transaction, LogBuilder};
    use crate::generators::{log_strategy, PropTestConfig};
    use proptest::prelude::*;
    use txlog_core::channel::WriteLogChannel;
    use txlog_core::entry::codes::CHECK_POINT;
    use txlog_core::{
        write_log_header, LogEntryVersion, LogEntryWriter, LogError, LogFile, LogPosition,
        BASE_TX_ID,
    };
    use txlog_storage::InMemoryBackend;

    fn fixture(version: LogEntryVersion) -> TestLog {
        let builder = LogBuilder::new(version).sample_transactions(2);
        let builder = if version.parsers().supports(CHECK_POINT) {
            builder.checkpoint(LogPosition::new(0, 16))
        } else {
            builder
        };
        builder.sample_transactions(1).build()
    }

    #[test]
    fn every_cut_of_every_generation_recovers() {
        for version in LogEntryVersion::ALL {
            let log = fixture(version);
            for cut in log.header_size as usize..=log.len() {
                let result = verify_torn_recovery(&log, cut);
                assert!(result.passed, "{version}: {result:?}");
            }
        }
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_logs_recover_at_any_cut(
            (version, txs) in log_strategy(4),
            cut_fraction in 0.0f64..=1.0,
        ) {
            let mut builder = LogBuilder::new(version);
            for tx in &txs {
                builder = builder.transaction(tx);
            }
            let log = builder.build();
            let span = (log.len() as u64 - log.header_size) as f64;
            let cut = log.header_size as usize + (span * cut_fraction) as usize;

            let result = verify_torn_recovery(&log, cut);
            prop_assert!(result.passed, "{:?}", result);
        }
    }

    #[test]
    fn zero_fill_after_the_last_transaction_is_clean() {
        let log = fixture(LogEntryVersion::V4_0);
        let backend = InMemoryBackend::with_data(zero_filled(&log.bytes, 4096));
        let report = RecoveryScanner::scan(&backend, &LogConfig::default()).unwrap();
        assert!(report.is_clean());
        assert!(report.needs_truncation());
        assert_eq!(report.committed_transactions, 3);
        assert_eq!(report.recoverable_end.byte_offset as usize, log.len());
    }

    #[test]
    fn garbage_tail_is_reported_as_corruption() {
        let log = fixture(LogEntryVersion::V3_0);
        let backend = InMemoryBackend::with_data(with_garbage_tail(&log.bytes, &[0xC0, 9, 9, 9]));

        let strict = RecoveryScanner::scan(&backend, &LogConfig::default());
        assert!(matches!(strict, Err(LogError::UnrecognizedVersion { .. })));

        let config = LogConfig::default().fail_on_corruption(false);
        let report = RecoveryScanner::scan(&backend, &config).unwrap();
        assert_eq!(report.committed_transactions, 3);
        assert_eq!(report.recoverable_end.byte_offset as usize, log.len());
        assert_eq!(report.unreadable_bytes, 4);
        let corruption = report.corruption.unwrap();
        assert_eq!(corruption.position.byte_offset as usize, log.len());
    }

    #[test]
    fn flipped_header_byte_fails_the_checksum() {
        let log = LogBuilder::new(LogEntryVersion::V4_0)
            .sample_transactions(2)
            .build();
        let second_start = log.transaction_ends[0] as usize;
        let marker = log.bytes[second_start..]
            .windows(3)
            .position(|w| w == [0xA5; 3])
            .unwrap();
        let corrupted = flip_byte(&log.bytes, second_start + marker);
        let backend = InMemoryBackend::with_data(corrupted);

        let config = LogConfig::default().fail_on_corruption(false);
        let report = RecoveryScanner::scan(&backend, &config).unwrap();
        assert_eq!(report.committed_transactions, 1);
        assert_eq!(report.recoverable_end.byte_offset as u64, log.transaction_ends[0]);
        assert!(report.corruption.is_some());

        let unverified = config.verify_checksums(false);
        let report = RecoveryScanner::scan(&backend, &unverified).unwrap();
        assert_eq!(report.committed_transactions, 2);
    }

    #[test]
    fn crash_mid_transaction_then_append() {
        let version = LogEntryVersion::CURRENT;
        let reference = LogBuilder::new(version).sample_transactions(3).build();
        let crash_at = reference.transaction_ends[1] as usize + 5;

        let (backend, handle) = CrashableBackend::new(crash_at);
        let mut channel = WriteLogChannel::new(Box::new(backend), 0).unwrap();
        write_log_header(&mut channel, &reference.header).unwrap();
        let mut writer = LogEntryWriter::new(channel).with_version(version);
        let mut written = 0;
        for tx in &reference.transactions {
            let outcome = writer.write_transaction(tx).and_then(|_| writer.flush());
            if outcome.is_err() {
                break;
            }
            written += 1;
        }
        assert!(handle.has_crashed());
        assert_eq!(written, 2);
        assert_eq!(handle.data().len(), crash_at);

        let torn = InMemoryBackend::with_data(handle.data());
        let (mut log, report) =
            LogFile::open_for_append(Box::new(torn), &LogConfig::default()).unwrap();
        assert_eq!(report.committed_transactions, 2);
        assert!(report.needs_truncation());
        assert_eq!(log.position().byte_offset as u64, reference.transaction_ends[1]);

        log.writer()
            .write_transaction(&sample_transaction(version, BASE_TX_ID + 3))
            .unwrap();
        let backend = log.into_backend().unwrap();
        let recovered = read_transactions(backend.as_ref()).unwrap();
        assert_eq!(recovered.len(), 3);
        assert_eq!(
            backend.size().unwrap(),
            reference.len() as u64,
            "rewritten log matches an uninterrupted one"
        );
    }

    #[test]
    fn crashed_backend_rejects_further_io() {
        let (mut backend, handle) = CrashableBackend::new(4);
        assert_eq!(backend.append(b"ab").unwrap(), 0);
        assert!(backend.append(b"cdef").is_err());
        assert!(backend.append(b"g").is_err());
        assert!(backend.sync().is_err());
        assert_eq!(handle.data(), b"abcd");
        assert_eq!(backend.read_at(1, 3).unwrap(), b"bcd");
    }
}
