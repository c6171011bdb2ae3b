//! Log fixtures.
//!
//! [`LogBuilder`] writes a header and entries of one generation into
//! memory and remembers where every transaction ends, so tests can cut
//! the result at any byte and know what recovery should find.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use txlog_core::channel::WriteLogChannel;
use txlog_core::{
    write_log_header, CommittedTransaction, LogConfig, LogEntry, LogEntryCommit, LogEntryReader,
    LogEntryStart, LogEntryVersion, LogEntryWriter, LogHeader, LogPosition, LogResult,
    StorageCommand, StoreId, TransactionCursor, BASE_TX_ID,
};
use txlog_storage::{FileBackend, InMemoryBackend, StorageBackend};

/// Store identity written into fixture headers that carry one.
pub fn fixed_store_id() -> StoreId {
    StoreId {
        creation_time: 1_577_836_800_000,
        random_id: 0x5EED_0000_0000_0001,
        store_version: 1,
        upgrade_time: 1_577_836_800_000,
        upgrade_tx_id: BASE_TX_ID,
    }
}

/// Header a file written by `version` would have.
pub fn header_for(
    version: LogEntryVersion,
    log_version: i64,
    last_committed_tx_id: i64,
) -> LogHeader {
    let format = version.log_header_format();
    if format == txlog_core::CURRENT_LOG_FORMAT_VERSION {
        LogHeader::current(log_version, last_committed_tx_id, &fixed_store_id())
    } else {
        LogHeader::new(format, log_version, last_committed_tx_id)
    }
}

/// A small deterministic transaction with two commands.
pub fn sample_transaction(version: LogEntryVersion, tx_id: i64) -> CommittedTransaction {
    let command = |kind: u8, len: usize| {
        StorageCommand::new(kind, vec![kind; len]).expect("sample command kinds are non-zero")
    };
    CommittedTransaction {
        start: LogEntryStart {
            version,
            master_id: 1,
            author_id: 2,
            time_written: crate::GENERATED_EPOCH_MILLIS + tx_id,
            last_committed_tx_when_started: if version == LogEntryVersion::V1_9 {
                0
            } else {
                tx_id - 1
            },
            additional_header: vec![0xA5; 3],
            start_position: LogPosition::UNSPECIFIED,
        },
        commands: vec![command(7, 4), command(9, 11)],
        commit: LogEntryCommit {
            version,
            tx_id,
            time_written: crate::GENERATED_EPOCH_MILLIS + tx_id + 1,
        },
        commit_position: LogPosition::UNSPECIFIED,
    }
}

/// Clears the read-back entry positions, so a transaction
/// read from a log compares equal to the one that was written.
pub fn without_positions(transaction: &CommittedTransaction) -> CommittedTransaction {
    let mut transaction = transaction.clone();
    transaction.start.start_position = LogPosition::UNSPECIFIED;
    transaction.commit_position = LogPosition::UNSPECIFIED;
    transaction
}

/// Reads every committed transaction from a log with a header.
pub fn read_transactions(backend: &dyn StorageBackend) -> LogResult<Vec<CommittedTransaction>> {
    let reader = LogEntryReader::open(backend, &LogConfig::default())?;
    TransactionCursor::new(reader).collect()
}

/// Writes a log of one generation entry by entry.
pub struct LogBuilder {
    header: LogHeader,
    writer: LogEntryWriter<WriteLogChannel>,
    transactions: Vec<CommittedTransaction>,
    transaction_ends: Vec<u64>,
    boundaries: Vec<u64>,
}

impl LogBuilder {
    /// Starts a log with the header `version` is written under.
    pub fn new(version: LogEntryVersion) -> Self {
        Self::with_header(version, header_for(version, 0, BASE_TX_ID))
    }

    /// Starts a log with an explicit header.
    pub fn with_header(version: LogEntryVersion, header: LogHeader) -> Self {
        let mut channel = WriteLogChannel::new(Box::new(InMemoryBackend::new()), header.log_version)
            .expect("Failed to create log channel");
        write_log_header(&mut channel, &header).expect("Failed to write log header");
        Self {
            header,
            writer: LogEntryWriter::new(channel).with_version(version),
            transactions: Vec::new(),
            transaction_ends: Vec::new(),
            boundaries: Vec::new(),
        }
    }

    /// Appends a whole transaction.
    pub fn transaction(mut self, transaction: &CommittedTransaction) -> Self {
        self.writer
            .write_transaction(transaction)
            .expect("Failed to write transaction");
        self.transactions.push(transaction.clone());
        self.transaction_ends.push(self.offset());
        self.boundaries.push(self.offset());
        self
    }

    /// Appends `count` sample transactions after the last one written.
    pub fn sample_transactions(mut self, count: usize) -> Self {
        let version = self.writer.version();
        for _ in 0..count {
            let tx_id = self
                .transactions
                .last()
                .map_or(BASE_TX_ID + 1, |tx| tx.tx_id() + 1);
            self = self.transaction(&sample_transaction(version, tx_id));
        }
        self
    }

    /// Appends a checkpoint.
    pub fn checkpoint(mut self, log_position: LogPosition) -> Self {
        self.writer
            .write_checkpoint_entry(log_position)
            .expect("Failed to write checkpoint");
        self.boundaries.push(self.offset());
        self
    }

    /// Appends a single raw entry. It does not count as a boundary.
    pub fn entry(mut self, entry: &LogEntry) -> Self {
        self.writer.write_entry(entry).expect("Failed to write entry");
        self
    }

    /// Switches the generation of subsequent entries.
    pub fn switch_version(mut self, version: LogEntryVersion) -> Self {
        self.writer = self.writer.with_version(version);
        self
    }

    fn offset(&self) -> u64 {
        self.writer.position().byte_offset as u64
    }

    /// Finishes the log.
    pub fn build(self) -> TestLog {
        let backend = self
            .writer
            .into_channel()
            .into_inner()
            .expect("Failed to flush log");
        let bytes = backend.read_all().expect("Failed to read log");
        let header_size = self.header.size().expect("Fixture header has a known format") as u64;
        TestLog {
            header: self.header,
            header_size,
            bytes,
            transactions: self.transactions,
            transaction_ends: self.transaction_ends,
            boundaries: self.boundaries,
        }
    }
}

/// A finished fixture log.
#[derive(Debug, Clone)]
pub struct TestLog {
    /// The file header.
    pub header: LogHeader,
    /// Encoded header size.
    pub header_size: u64,
    /// The whole file.
    pub bytes: Vec<u8>,
    /// Transactions in write order.
    pub transactions: Vec<CommittedTransaction>,
    /// Offset after each transaction.
    pub transaction_ends: Vec<u64>,
    /// Offsets after each transaction or checkpoint.
    pub boundaries: Vec<u64>,
}

impl TestLog {
    /// File length.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the file is empty. Never true for a built log.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The whole file in a fresh backend.
    pub fn backend(&self) -> InMemoryBackend {
        InMemoryBackend::with_data(self.bytes.clone())
    }

    /// The first `len` bytes in a fresh backend.
    pub fn torn_at(&self, len: usize) -> InMemoryBackend {
        InMemoryBackend::with_data(self.bytes[..len.min(self.bytes.len())].to_vec())
    }

    /// End of the last transaction or checkpoint that fits in `len`
    /// bytes.
    pub fn recoverable_end_within(&self, len: u64) -> u64 {
        self.boundaries
            .iter()
            .copied()
            .filter(|end| *end <= len)
            .max()
            .unwrap_or(self.header_size)
    }

    /// Transactions that fit completely in `len` bytes.
    pub fn transactions_within(&self, len: u64) -> Vec<CommittedTransaction> {
        self.transactions
            .iter()
            .zip(&self.transaction_ends)
            .filter(|(_, end)| **end <= len)
            .map(|(tx, _)| tx.clone())
            .collect()
    }

    /// Copies the file into a temp directory.
    pub fn to_temp_file(&self, name: &str) -> TempLogFile {
        TempLogFile::with_bytes(name, &self.bytes)
    }
}

/// A log file in a temporary directory, deleted on drop.
pub struct TempLogFile {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TempLogFile {
    /// Creates an empty file named `name`.
    pub fn new(name: &str) -> Self {
        Self::with_bytes(name, &[])
    }

    /// Creates a file named `name` holding `bytes`.
    pub fn with_bytes(name: &str, bytes: &[u8]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join(name);
        let mut backend =
            FileBackend::open_with_create_dirs(&path).expect("Failed to create log file");
        if !bytes.is_empty() {
            backend.append(bytes).expect("Failed to write log file");
        }
        backend.sync().expect("Failed to sync log file");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file.
    pub fn backend(&self) -> FileBackend {
        FileBackend::open_existing(&self.path).expect("Failed to open log file")
    }
}
