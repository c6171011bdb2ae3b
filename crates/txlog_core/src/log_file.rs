//! Creating and reopening log files for appending.

use crate::channel::{WritableChannel, WriteLogChannel};
use crate::config::LogConfig;
use crate::entry::{LogEntryVersion, LogEntryWriter};
use crate::error::{LogError, LogResult};
use crate::header::{write_log_header, LogHeader};
use crate::recovery::{RecoveryReport, RecoveryScanner};
use crate::types::LogPosition;
use tracing::{info, warn};
use txlog_storage::StorageBackend;

/// A log file open for appending.
///
/// Entries are written in the newest generation the file's header
/// format allows.
///
/// # Example
///
/// ```rust
/// use txlog_core::{LogConfig, LogFile, LogHeader, StoreId};
/// use txlog_storage::InMemoryBackend;
///
/// let header = LogHeader::current(0, 1, &StoreId::generate(0, 1));
/// let config = LogConfig::default();
/// let mut log = LogFile::create(Box::new(InMemoryBackend::new()), header, &config).unwrap();
/// log.writer().write_start_entry(1, 1, 0, 1, b"").unwrap();
/// log.writer().write_commit_entry(2, 0).unwrap();
/// log.flush().unwrap();
/// ```
pub struct LogFile {
    header: LogHeader,
    writer: LogEntryWriter<WriteLogChannel>,
}

impl LogFile {
    /// Writes `header` to an empty backend.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the backend already has content, or
    /// the header encoding error.
    pub fn create(
        backend: Box<dyn StorageBackend>,
        header: LogHeader,
        config: &LogConfig,
    ) -> LogResult<Self> {
        let size = backend.size()?;
        if size != 0 {
            return Err(LogError::invalid_argument(format!(
                "cannot create a log over {size} bytes of existing content"
            )));
        }
        let version = writer_version(&header)?;

        let mut channel =
            WriteLogChannel::new(backend, header.log_version)?.sync_on_flush(config.sync_on_write);
        write_log_header(&mut channel, &header)?;
        channel.flush()?;

        info!(%header, "created log file");
        Ok(Self {
            header,
            writer: LogEntryWriter::new(channel).with_version(version),
        })
    }

    /// Scans an existing log, cuts everything after its last complete
    /// transaction, and positions for appending.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a file without a header, and any
    /// scan error.
    pub fn open_for_append(
        mut backend: Box<dyn StorageBackend>,
        config: &LogConfig,
    ) -> LogResult<(Self, RecoveryReport)> {
        let report = RecoveryScanner::scan(backend.as_ref(), config)?;
        let Some(header) = report.header else {
            return Err(LogError::invalid_argument(
                "log file has no header; create it instead",
            ));
        };
        let version = writer_version(&header)?;

        if report.needs_truncation() {
            let end = report.recoverable_end.byte_offset as u64;
            warn!(
                from = report.file_size,
                to = end,
                "truncating log tail before appending"
            );
            backend.truncate(end)?;
            backend.sync()?;
        }

        let channel =
            WriteLogChannel::new(backend, header.log_version)?.sync_on_flush(config.sync_on_write);
        let log = Self {
            header,
            writer: LogEntryWriter::new(channel).with_version(version),
        };
        Ok((log, report))
    }

    /// The file header.
    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    /// Entry writer positioned at the end of the file.
    pub fn writer(&mut self) -> &mut LogEntryWriter<WriteLogChannel> {
        &mut self.writer
    }

    /// Position the next entry will be written at.
    pub fn position(&self) -> LogPosition {
        self.writer.position()
    }

    /// Flushes written entries to the backend, syncing if configured.
    ///
    /// # Errors
    ///
    /// Returns the backend's flush or sync error.
    pub fn flush(&mut self) -> LogResult<()> {
        self.writer.flush()
    }

    /// Flushes and hands back the backend.
    ///
    /// # Errors
    ///
    /// Returns the final flush error.
    pub fn into_backend(self) -> LogResult<Box<dyn StorageBackend>> {
        self.writer.into_channel().into_inner()
    }
}

fn writer_version(header: &LogHeader) -> LogResult<LogEntryVersion> {
    LogEntryVersion::latest_for_header_format(header.format_version).ok_or(
        LogError::UnsupportedLogFormat {
            format_version: header.format_version,
        },
    )
}
