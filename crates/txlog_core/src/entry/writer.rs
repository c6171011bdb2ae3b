//! Entry encoder for a chosen format generation.

use super::codes::{CHECK_POINT, COMMAND, DONE, TX_1P_COMMIT, TX_2P_COMMIT, TX_PREPARE, TX_START};
use super::{LogEntry, LogEntryVersion};
use crate::channel::WritableChannel;
use crate::command::{CommandWriter, StorageCommand};
use crate::cursor::CommittedTransaction;
use crate::error::{LogError, LogResult};
use crate::types::LogPosition;

/// Format id stamped into legacy global transaction ids.
const LEGACY_FORMAT_ID: i32 = 0x5458_4C47;

/// Writes entries in the layout of one [`LogEntryVersion`].
///
/// Entries go through the channel's buffer; call [`flush`](Self::flush)
/// to make them durable. For the current generation the writer starts a
/// checksum region before each Start and appends the checksum to the
/// matching Commit.
///
/// Identifier-framed generations get identifiers assigned here: each
/// Start takes the next one, and the following entries reuse it until
/// the next Start.
pub struct LogEntryWriter<C> {
    channel: C,
    version: LogEntryVersion,
    next_identifier: i32,
    current_identifier: i32,
}

impl<C: WritableChannel> LogEntryWriter<C> {
    /// Creates a writer for [`LogEntryVersion::CURRENT`].
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            version: LogEntryVersion::CURRENT,
            next_identifier: 1,
            current_identifier: 0,
        }
    }

    /// Targets another generation.
    #[must_use]
    pub fn with_version(mut self, version: LogEntryVersion) -> Self {
        self.version = version;
        self
    }

    /// Generation being written.
    pub fn version(&self) -> LogEntryVersion {
        self.version
    }

    /// Position the next entry will start at.
    pub fn position(&self) -> LogPosition {
        self.channel.position()
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Unwraps the channel without flushing.
    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Flushes the channel.
    ///
    /// # Errors
    ///
    /// Returns the channel's flush error.
    pub fn flush(&mut self) -> LogResult<()> {
        self.channel.flush()
    }

    fn require(&self, type_code: u8, entry: &'static str) -> LogResult<()> {
        if self.version.parsers().supports(type_code) {
            Ok(())
        } else {
            Err(LogError::UnsupportedEntry {
                entry,
                version: self.version,
            })
        }
    }

    fn put_prefix(&mut self, type_code: u8) -> LogResult<()> {
        if self.version.writes_version_byte() {
            self.channel.put_i8(self.version.code())?;
        }
        self.channel.put_u8(type_code)
    }

    /// Writes a Start entry and returns its position.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the additional header is too long for
    /// the generation (255 bytes when identifier-framed), or a channel
    /// error.
    pub fn write_start_entry(
        &mut self,
        master_id: i32,
        author_id: i32,
        time_written: i64,
        last_committed_tx_when_started: i64,
        additional_header: &[u8],
    ) -> LogResult<LogPosition> {
        self.require(TX_START, "start")?;
        let max_header = if self.version.is_identifier_framed() {
            usize::from(u8::MAX)
        } else {
            i32::MAX as usize
        };
        if additional_header.len() > max_header {
            return Err(LogError::invalid_argument(format!(
                "additional header of {} bytes exceeds {max_header} for format {}",
                additional_header.len(),
                self.version
            )));
        }

        let position = self.position();
        if self.version.has_commit_checksum() {
            self.channel.begin_checksum();
        }
        self.put_prefix(TX_START)?;

        if self.version.is_identifier_framed() {
            self.current_identifier = self.next_identifier;
            self.next_identifier = self.next_identifier.wrapping_add(1);
            self.channel.put_i32(self.current_identifier)?;
            self.channel.put_i32(LEGACY_FORMAT_ID)?;
            self.channel.put_u8(additional_header.len() as u8)?;
            self.channel.put_u8(0)?;
            self.channel.put_bytes(additional_header)?;
            self.channel.put_i32(master_id)?;
            self.channel.put_i32(author_id)?;
            self.channel.put_i64(time_written)?;
            if self.version == LogEntryVersion::V2_0 {
                self.channel.put_i64(last_committed_tx_when_started)?;
            }
        } else {
            self.channel.put_i32(master_id)?;
            self.channel.put_i32(author_id)?;
            self.channel.put_i64(time_written)?;
            self.channel.put_i64(last_committed_tx_when_started)?;
            self.channel.put_i32(additional_header.len() as i32)?;
            self.channel.put_bytes(additional_header)?;
        }
        Ok(position)
    }

    /// Writes a Command entry and returns its position.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the payload does not fit the
    /// generation's command framing, or a channel error.
    pub fn write_command_entry(&mut self, command: &StorageCommand) -> LogResult<LogPosition> {
        self.require(COMMAND, "command")?;
        let format = self.version.command_format();
        if command.payload().len() > format.max_payload() {
            return Err(LogError::invalid_argument(format!(
                "command payload of {} bytes does not fit format {}",
                command.payload().len(),
                self.version
            )));
        }

        let position = self.position();
        self.put_prefix(COMMAND)?;
        if self.version.is_identifier_framed() {
            self.channel.put_i32(self.current_identifier)?;
        }
        format.write(command, &mut self.channel)?;
        Ok(position)
    }

    /// Writes a one-phase Commit entry and returns its position.
    ///
    /// # Errors
    ///
    /// Returns a channel error.
    pub fn write_commit_entry(&mut self, tx_id: i64, time_written: i64) -> LogResult<LogPosition> {
        self.write_commit(TX_1P_COMMIT, tx_id, time_written)
    }

    /// Writes a two-phase Commit entry and returns its position.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedEntry` for generations without two-phase
    /// commit (2.2 and later).
    pub fn write_two_phase_commit_entry(
        &mut self,
        tx_id: i64,
        time_written: i64,
    ) -> LogResult<LogPosition> {
        self.write_commit(TX_2P_COMMIT, tx_id, time_written)
    }

    fn write_commit(
        &mut self,
        type_code: u8,
        tx_id: i64,
        time_written: i64,
    ) -> LogResult<LogPosition> {
        let name = if type_code == TX_2P_COMMIT {
            "two-phase commit"
        } else {
            "commit"
        };
        self.require(type_code, name)?;

        let position = self.position();
        self.put_prefix(type_code)?;
        if self.version.is_identifier_framed() {
            self.channel.put_i32(self.current_identifier)?;
        }
        self.channel.put_i64(tx_id)?;
        self.channel.put_i64(time_written)?;
        if self.version.has_commit_checksum() {
            self.channel.put_checksum()?;
        }
        Ok(position)
    }

    /// Writes a CheckPoint entry and returns its position.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedEntry` before 3.0.
    pub fn write_checkpoint_entry(&mut self, log_position: LogPosition) -> LogResult<LogPosition> {
        self.require(CHECK_POINT, "checkpoint")?;
        let position = self.position();
        self.put_prefix(CHECK_POINT)?;
        self.channel.put_i64(log_position.log_version)?;
        self.channel.put_i64(log_position.byte_offset)?;
        Ok(position)
    }

    /// Writes a legacy Prepare marker for the current transaction.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedEntry` outside identifier-framed generations.
    pub fn write_legacy_prepare_entry(&mut self, time_written: i64) -> LogResult<LogPosition> {
        self.require(TX_PREPARE, "prepare")?;
        let position = self.position();
        self.put_prefix(TX_PREPARE)?;
        self.channel.put_i32(self.current_identifier)?;
        self.channel.put_i64(time_written)?;
        Ok(position)
    }

    /// Writes a legacy Done marker for the current transaction.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedEntry` outside identifier-framed generations.
    pub fn write_legacy_done_entry(&mut self) -> LogResult<LogPosition> {
        self.require(DONE, "done")?;
        let position = self.position();
        self.put_prefix(DONE)?;
        self.channel.put_i32(self.current_identifier)?;
        Ok(position)
    }

    /// Writes any entry value in this writer's generation.
    ///
    /// The entry's own version and start position are ignored.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedEntry` for [`LogEntry::Empty`] or for kinds
    /// the generation lacks.
    pub fn write_entry(&mut self, entry: &LogEntry) -> LogResult<LogPosition> {
        match entry {
            LogEntry::Start(start) => self.write_start_entry(
                start.master_id,
                start.author_id,
                start.time_written,
                start.last_committed_tx_when_started,
                &start.additional_header,
            ),
            LogEntry::Command(command) => self.write_command_entry(&command.command),
            LogEntry::Commit(commit) => self.write_commit_entry(commit.tx_id, commit.time_written),
            LogEntry::CheckPoint(check_point) => {
                self.write_checkpoint_entry(check_point.log_position)
            }
            LogEntry::LegacyPrepare { time_written, .. } => {
                self.write_legacy_prepare_entry(*time_written)
            }
            LogEntry::LegacyDone { .. } => self.write_legacy_done_entry(),
            LogEntry::Empty => Err(LogError::UnsupportedEntry {
                entry: "empty",
                version: self.version,
            }),
        }
    }

    /// Writes a whole transaction and returns the position of its Start.
    ///
    /// # Errors
    ///
    /// Returns the first entry's error; earlier entries of the
    /// transaction may already be buffered.
    pub fn write_transaction(
        &mut self,
        transaction: &CommittedTransaction,
    ) -> LogResult<LogPosition> {
        let start = &transaction.start;
        let position = self.write_start_entry(
            start.master_id,
            start.author_id,
            start.time_written,
            start.last_committed_tx_when_started,
            &start.additional_header,
        )?;
        for command in &transaction.commands {
            self.write_command_entry(command)?;
        }
        self.write_commit_entry(transaction.commit.tx_id, transaction.commit.time_written)?;
        Ok(position)
    }
}
