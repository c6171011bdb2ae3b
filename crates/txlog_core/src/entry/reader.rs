//! Entry decoder for mixed-generation log files.

use super::codes::EMPTY;
use super::parsers::ParseContext;
use super::{LogEntry, LogEntryVersion};
use crate::channel::{ReadLogChannel, ReadableChannel};
use crate::command::{CommandReaderFactory, StandardCommandReaders};
use crate::config::LogConfig;
use crate::error::{LogError, LogResult};
use crate::header::{read_log_header, LogHeader, CURRENT_LOG_FORMAT_VERSION};
use crate::types::LogPosition;
use tracing::debug;
use txlog_storage::StorageBackend;

/// Where the reader is relative to transaction boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Outside,
    /// `checksummed` is set when the checksum region began at the Start.
    Inside { checksummed: bool },
}

enum Decoded {
    Entry(LogEntry),
    Skipped,
    End,
}

/// Reads entries one at a time, resolving each entry's generation from
/// its own version byte.
///
/// A torn entry at the end of the data, zero-filled space, or a torn
/// command all end the stream with `Ok(None)` and leave
/// [`position`](Self::position) at the start of the incomplete entry, so
/// a writer can resume there.
///
/// # Example
///
/// ```rust
/// use txlog_core::{LogConfig, LogEntryReader};
/// use txlog_storage::InMemoryBackend;
///
/// let backend = InMemoryBackend::new();
/// let mut reader = LogEntryReader::open(&backend, &LogConfig::default()).unwrap();
/// assert!(reader.header().is_none());
/// assert!(reader.read_next().unwrap().is_none());
/// ```
pub struct LogEntryReader<'a> {
    channel: ReadLogChannel<'a>,
    header: Option<LogHeader>,
    header_format: u8,
    commands: Box<dyn CommandReaderFactory + 'a>,
    cached_version: Option<(i8, LogEntryVersion)>,
    verify_checksums: bool,
    tx_state: TxState,
    last_entry_position: LogPosition,
    finished: bool,
}

impl<'a> LogEntryReader<'a> {
    /// Creates a reader over a channel already positioned at the first
    /// entry.
    ///
    /// `header_format` breaks ties between generations that share the
    /// un-versioned entry code.
    pub fn new(channel: ReadLogChannel<'a>, header_format: u8) -> Self {
        Self {
            channel,
            header: None,
            header_format,
            commands: Box::new(StandardCommandReaders),
            cached_version: None,
            verify_checksums: true,
            tx_state: TxState::Outside,
            last_entry_position: LogPosition::UNSPECIFIED,
            finished: false,
        }
    }

    /// Reads the header of `backend` and positions after it.
    ///
    /// If the header is incomplete and `config.strict_header` is off, the
    /// reader has no header and yields no entries.
    ///
    /// # Errors
    ///
    /// Returns header errors, or a storage error.
    pub fn open(backend: &'a dyn StorageBackend, config: &LogConfig) -> LogResult<Self> {
        let header = read_log_header(backend, config.strict_header)?;
        let log_version = header.map_or(0, |h| h.log_version);
        let mut channel = ReadLogChannel::new(backend, log_version, config.read_buffer_size)?;

        let header_format = match &header {
            Some(h) => {
                channel.set_offset(h.size()? as u64)?;
                h.format_version
            }
            None => {
                let end = channel.size();
                channel.set_offset(end)?;
                CURRENT_LOG_FORMAT_VERSION
            }
        };

        let mut reader =
            Self::new(channel, header_format).verify_checksums(config.verify_checksums);
        reader.header = header;
        Ok(reader)
    }

    /// Replaces the command decoders.
    #[must_use]
    pub fn with_command_readers(mut self, commands: impl CommandReaderFactory + 'a) -> Self {
        self.commands = Box::new(commands);
        self
    }

    /// Sets whether transaction checksums are verified.
    #[must_use]
    pub fn verify_checksums(mut self, value: bool) -> Self {
        self.verify_checksums = value;
        self
    }

    /// The file header, when opened with [`open`](Self::open).
    pub fn header(&self) -> Option<&LogHeader> {
        self.header.as_ref()
    }

    /// Header format used to resolve un-versioned entries.
    pub fn header_format(&self) -> u8 {
        self.header_format
    }

    /// End of the last fully read entry.
    pub fn position(&self) -> LogPosition {
        self.channel.position()
    }

    /// Start of the last entry returned.
    pub fn last_entry_position(&self) -> LogPosition {
        self.last_entry_position
    }

    /// Size of the data being read.
    pub fn data_size(&self) -> u64 {
        self.channel.size()
    }

    /// Reads the next entry.
    ///
    /// Returns `Ok(None)` at the end of the readable data. After an error
    /// the reader is finished and keeps returning `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - `UnrecognizedVersion` / `UnknownEntryType` for bytes no
    ///   generation can parse
    /// - `ChecksumMismatch` when a verified transaction checksum is wrong
    /// - `Corrupted` for impossible lengths
    pub fn read_next(&mut self) -> LogResult<Option<LogEntry>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let start = self.channel.position();
            let start_offset = self.channel.offset();
            if self.tx_state == TxState::Outside {
                self.channel.begin_checksum();
            }

            match self.decode(start) {
                Ok(Decoded::Entry(entry)) => {
                    self.track(&entry);
                    self.last_entry_position = start;
                    return Ok(Some(entry));
                }
                Ok(Decoded::Skipped) => continue,
                Ok(Decoded::End) => {
                    self.channel.set_offset(start_offset)?;
                    return Ok(None);
                }
                Err(e) if e.is_past_end() => {
                    debug!(position = %start, "incomplete entry at end of log");
                    self.channel.set_offset(start_offset)?;
                    return Ok(None);
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            }
        }
    }

    fn decode(&mut self, start: LogPosition) -> LogResult<Decoded> {
        let first = self.channel.get_i8()?;
        let (version_code, type_code) = if first < 0 {
            (first, self.channel.get_u8()?)
        } else if first as u8 == EMPTY {
            return Ok(Decoded::End);
        } else {
            (0, first as u8)
        };

        let version = self.resolve(version_code, start)?;
        let parser = *version
            .parsers()
            .get(type_code)
            .ok_or(LogError::UnknownEntryType {
                type_code,
                version_code,
                position: start,
            })?;

        let mut ctx = ParseContext {
            version,
            channel: &mut self.channel,
            start_position: start,
            commands: self.commands.as_ref(),
            verify_checksum: self.verify_checksums
                && self.tx_state == (TxState::Inside { checksummed: true }),
        };
        let parsed = (parser.parse)(&mut ctx)?;

        Ok(match parsed {
            _ if parser.skip => Decoded::Skipped,
            None | Some(LogEntry::Empty) => Decoded::End,
            Some(entry) => Decoded::Entry(entry),
        })
    }

    fn resolve(&mut self, version_code: i8, start: LogPosition) -> LogResult<LogEntryVersion> {
        if let Some((code, version)) = self.cached_version {
            if code == version_code {
                return Ok(version);
            }
        }
        let version = LogEntryVersion::lookup(version_code, self.header_format).ok_or(
            LogError::UnrecognizedVersion {
                version_code,
                header_format: self.header_format,
                position: start,
            },
        )?;
        self.cached_version = Some((version_code, version));
        Ok(version)
    }

    fn track(&mut self, entry: &LogEntry) {
        self.tx_state = match entry {
            LogEntry::Start(_) => TxState::Inside {
                checksummed: self.tx_state == TxState::Outside,
            },
            LogEntry::Commit(_) => TxState::Outside,
            _ => self.tx_state,
        };
    }
}

impl Iterator for LogEntryReader<'_> {
    type Item = LogResult<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::WriteLogChannel;
    use crate::command::{CommandReader, StorageCommand};
    use crate::entry::codes::{TX_1P_COMMIT, TX_START};
    use crate::entry::{LogEntryCommit, LogEntryWriter};
    use crate::header::{write_log_header, LOG_VERSION_2_1};
    use txlog_storage::InMemoryBackend;

    fn reader_over(backend: &InMemoryBackend, header_format: u8) -> LogEntryReader<'_> {
        LogEntryReader::new(ReadLogChannel::new(backend, 0, 16).unwrap(), header_format)
    }

    fn written(
        version: LogEntryVersion,
        build: impl FnOnce(&mut LogEntryWriter<WriteLogChannel>),
    ) -> Vec<u8> {
        let channel = WriteLogChannel::new(Box::new(InMemoryBackend::new()), 0).unwrap();
        let mut writer = LogEntryWriter::new(channel).with_version(version);
        build(&mut writer);
        let backend = writer.into_channel().into_inner().unwrap();
        backend.read_all().unwrap()
    }

    fn one_transaction(version: LogEntryVersion) -> Vec<u8> {
        written(version, |w| {
            w.write_start_entry(1, 2, 3, 4, b"abc").unwrap();
            w.write_command_entry(&StorageCommand::new(1, vec![5; 10]).unwrap()).unwrap();
            w.write_commit_entry(6, 7).unwrap();
        })
    }

    #[test]
    fn hand_built_2_1_log() {
        // header(format 4, log version 7, last tx 100) + Start + Commit
        let mut bytes = LogHeader::new(LOG_VERSION_2_1, 7, 100).encode().unwrap();
        bytes.extend_from_slice(&[0xFF, TX_START]);
        bytes.extend_from_slice(&1i32.to_be_bytes());
        bytes.extend_from_slice(&2i32.to_be_bytes());
        bytes.extend_from_slice(&1_000i64.to_be_bytes());
        bytes.extend_from_slice(&100i64.to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&[0xFF, TX_1P_COMMIT]);
        bytes.extend_from_slice(&101i64.to_be_bytes());
        bytes.extend_from_slice(&2_000i64.to_be_bytes());
        let backend = InMemoryBackend::with_data(bytes);

        let mut reader = LogEntryReader::open(&backend, &LogConfig::default()).unwrap();
        assert_eq!(reader.header().unwrap().last_committed_tx_id, 100);

        let Some(LogEntry::Start(start)) = reader.read_next().unwrap() else {
            panic!("expected start");
        };
        assert_eq!(start.version, LogEntryVersion::V2_1);
        assert_eq!(start.start_position, LogPosition::new(7, 16));
        assert_eq!(start.last_committed_tx_when_started, 100);

        assert_eq!(
            reader.read_next().unwrap(),
            Some(LogEntry::Commit(LogEntryCommit {
                version: LogEntryVersion::V2_1,
                tx_id: 101,
                time_written: 2_000,
            }))
        );
        assert_eq!(reader.read_next().unwrap(), None);
        assert_eq!(reader.position().byte_offset, backend.data().len() as i64);
    }

    #[test]
    fn truncation_at_every_cut_returns_complete_prefix() {
        for version in LogEntryVersion::ALL {
            let full = one_transaction(version);
            let complete: Vec<LogEntry> = {
                let backend = InMemoryBackend::with_data(full.clone());
                reader_over(&backend, version.log_header_format())
                    .collect::<LogResult<_>>()
                    .unwrap()
            };
            assert_eq!(complete.len(), 3);

            for cut in 0..full.len() {
                let backend = InMemoryBackend::with_data(full[..cut].to_vec());
                let mut reader = reader_over(&backend, version.log_header_format());
                let mut read = Vec::new();
                while let Some(entry) = reader.read_next().unwrap() {
                    read.push(entry);
                }
                assert_eq!(read, complete[..read.len()], "{version} cut at {cut}");
                assert!(read.len() < 3, "{version} cut at {cut}");
                assert!(reader.position().byte_offset <= cut as i64);
            }
        }
    }

    #[test]
    fn zero_fill_ends_stream_at_its_start() {
        let mut bytes = one_transaction(LogEntryVersion::V3_0);
        let end = bytes.len();
        bytes.resize(end + 256, 0);
        let backend = InMemoryBackend::with_data(bytes);

        let mut reader = reader_over(&backend, LogEntryVersion::V3_0.log_header_format());
        let entries: Vec<_> = reader.by_ref().collect::<LogResult<_>>().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(reader.position().byte_offset, end as i64);
        assert_eq!(reader.read_next().unwrap(), None);
    }

    #[test]
    fn legacy_markers_are_skipped() {
        let bytes = written(LogEntryVersion::V1_9, |w| {
            w.write_start_entry(0, 0, 0, 0, b"").unwrap();
            w.write_command_entry(&StorageCommand::new(1, vec![1]).unwrap()).unwrap();
            w.write_legacy_prepare_entry(11).unwrap();
            w.write_commit_entry(2, 12).unwrap();
            w.write_legacy_done_entry().unwrap();
        });

        let backend = InMemoryBackend::with_data(bytes);
        let kinds: Vec<_> = reader_over(&backend, LogEntryVersion::V1_9.log_header_format())
            .map(|e| e.unwrap().kind())
            .collect();
        assert_eq!(kinds, vec!["start", "command", "commit"]);
    }

    #[test]
    fn unknown_type_reports_position() {
        let mut bytes = one_transaction(LogEntryVersion::V2_3);
        let at = bytes.len();
        bytes.extend_from_slice(&[LogEntryVersion::V2_3.code() as u8, 7, 0, 0]);
        let backend = InMemoryBackend::with_data(bytes);

        let mut reader = reader_over(&backend, LogEntryVersion::V2_3.log_header_format());
        let results: Vec<_> = reader.by_ref().collect();
        assert_eq!(results.len(), 4);
        assert!(matches!(
            results[3],
            Err(LogError::UnknownEntryType { type_code: 7, version_code: -4, position })
                if position == LogPosition::new(0, at as i64)
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn unrecognized_version_reports_header_format() {
        let backend = InMemoryBackend::with_data(vec![0xF0, TX_START, 0, 0]);
        let err = reader_over(&backend, 6).read_next().unwrap_err();
        assert!(matches!(
            err,
            LogError::UnrecognizedVersion { version_code: -16, header_format: 6, .. }
        ));
    }

    #[test]
    fn legacy_entry_in_non_legacy_file_is_unrecognized() {
        let bytes = one_transaction(LogEntryVersion::V2_0);
        let backend = InMemoryBackend::with_data(bytes);
        let err = reader_over(&backend, LogEntryVersion::V2_3.log_header_format())
            .read_next()
            .unwrap_err();
        assert!(matches!(err, LogError::UnrecognizedVersion { version_code: 0, .. }));
    }

    #[test]
    fn mixed_generations_in_one_file() {
        let mut bytes = one_transaction(LogEntryVersion::V2_2);
        bytes.extend(one_transaction(LogEntryVersion::V3_0));
        bytes.extend(one_transaction(LogEntryVersion::V4_0));
        let backend = InMemoryBackend::with_data(bytes);

        let versions: Vec<_> = reader_over(&backend, 7)
            .map(|e| e.unwrap().version().unwrap())
            .collect();
        assert_eq!(versions.len(), 9);
        assert_eq!(versions[0], LogEntryVersion::V2_2);
        assert_eq!(versions[4], LogEntryVersion::V3_0);
        assert_eq!(versions[8], LogEntryVersion::V4_0);
    }

    #[test]
    fn corrupted_transaction_fails_checksum() {
        let mut bytes = one_transaction(LogEntryVersion::V4_0);
        // Flip a payload byte of the command.
        let payload_at = bytes.len() - 30;
        bytes[payload_at] ^= 0xFF;
        let commit_at = bytes.len() - 22;
        let backend = InMemoryBackend::with_data(bytes);

        let results: Vec<_> = reader_over(&backend, 7).collect();
        assert!(matches!(
            results.last(),
            Some(Err(LogError::ChecksumMismatch { position, .. }))
                if *position == LogPosition::new(0, commit_at as i64)
        ));

        let unverified: Vec<_> = reader_over(&backend, 7)
            .verify_checksums(false)
            .collect::<LogResult<_>>()
            .unwrap();
        assert_eq!(unverified.len(), 3);
    }

    #[test]
    fn commit_without_start_is_not_verified() {
        let bytes = one_transaction(LogEntryVersion::V4_0);
        let commit_at = bytes.len() - 22;
        let backend = InMemoryBackend::with_data(bytes[commit_at..].to_vec());
        let entries: Vec<_> = reader_over(&backend, 7).collect::<LogResult<_>>().unwrap();
        assert_eq!(entries.len(), 1);
    }

    struct TornCommands;

    impl CommandReader for TornCommands {
        fn read(&self, channel: &mut dyn ReadableChannel) -> LogResult<Option<StorageCommand>> {
            channel.get_u8()?;
            Ok(None)
        }
    }

    impl CommandReaderFactory for TornCommands {
        fn by_version(&self, _version: LogEntryVersion) -> Option<&dyn CommandReader> {
            Some(self)
        }
    }

    #[test]
    fn torn_command_ends_stream_at_entry_start() {
        let bytes = one_transaction(LogEntryVersion::V3_0);
        let backend = InMemoryBackend::with_data(bytes);
        let mut reader = reader_over(&backend, 6).with_command_readers(TornCommands);

        assert_eq!(reader.read_next().unwrap().unwrap().kind(), "start");
        let command_at = reader.position();
        assert_eq!(reader.read_next().unwrap(), None);
        assert_eq!(reader.position(), command_at);
    }

    #[test]
    fn open_positions_after_current_header() {
        let header = LogHeader::current(3, 9, &crate::types::StoreId::generate(1, 1));
        let mut channel = WriteLogChannel::new(Box::new(InMemoryBackend::new()), 3).unwrap();
        write_log_header(&mut channel, &header).unwrap();
        let mut writer = LogEntryWriter::new(channel);
        writer.write_start_entry(0, 0, 0, 9, b"").unwrap();
        writer.write_commit_entry(10, 0).unwrap();
        let backend = writer.into_channel().into_inner().unwrap();

        let mut reader = LogEntryReader::open(backend.as_ref(), &LogConfig::default()).unwrap();
        assert_eq!(reader.header(), Some(&header));
        let entries: Vec<_> = reader.by_ref().collect::<LogResult<_>>().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(reader.last_entry_position(), LogPosition::new(3, 64 + 30));
    }
}
