//! Grouping of entries into committed transactions.

use crate::command::StorageCommand;
use crate::entry::{LogEntry, LogEntryCheckPoint, LogEntryCommit, LogEntryReader, LogEntryStart};
use crate::error::{LogError, LogResult};
use crate::types::LogPosition;
use tracing::debug;

/// A transaction whose Commit entry was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransaction {
    /// The Start entry.
    pub start: LogEntryStart,
    /// Commands in log order.
    pub commands: Vec<StorageCommand>,
    /// The Commit entry.
    pub commit: LogEntryCommit,
    /// Where the Commit entry begins.
    pub commit_position: LogPosition,
}

impl CommittedTransaction {
    /// Committed transaction id.
    #[must_use]
    pub fn tx_id(&self) -> i64 {
        self.commit.tx_id
    }
}

/// Reads whole transactions from an entry reader.
///
/// Entries must follow `Start, Command*, Commit`, with checkpoints only
/// between transactions. A transaction cut off by the end of the data is
/// dropped. [`recoverable_end`](Self::recoverable_end) is the position
/// after the last complete transaction or checkpoint.
pub struct TransactionCursor<'a> {
    reader: LogEntryReader<'a>,
    last_checkpoint: Option<LogEntryCheckPoint>,
    recoverable_end: LogPosition,
}

impl<'a> TransactionCursor<'a> {
    /// Wraps a reader positioned at a transaction boundary.
    pub fn new(reader: LogEntryReader<'a>) -> Self {
        let recoverable_end = reader.position();
        Self {
            reader,
            last_checkpoint: None,
            recoverable_end,
        }
    }

    /// Last checkpoint passed so far.
    pub fn last_checkpoint(&self) -> Option<&LogEntryCheckPoint> {
        self.last_checkpoint.as_ref()
    }

    /// End of the last complete transaction or checkpoint.
    pub fn recoverable_end(&self) -> LogPosition {
        self.recoverable_end
    }

    /// The wrapped reader.
    pub fn reader(&self) -> &LogEntryReader<'a> {
        &self.reader
    }

    /// Reads the next committed transaction.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEntrySequence` for a Command or Commit outside a
    /// transaction, or a Start or CheckPoint inside one; reader errors
    /// pass through.
    pub fn next_transaction(&mut self) -> LogResult<Option<CommittedTransaction>> {
        let mut open: Option<(LogEntryStart, Vec<StorageCommand>)> = None;

        loop {
            let Some(entry) = self.reader.read_next()? else {
                if let Some((start, commands)) = open {
                    debug!(
                        position = %start.start_position,
                        commands = commands.len(),
                        "dropping unterminated transaction at end of log"
                    );
                }
                return Ok(None);
            };
            let position = self.reader.last_entry_position();

            match entry {
                LogEntry::Start(start) => {
                    if open.is_some() {
                        return Err(LogError::invalid_sequence(
                            "start entry inside an open transaction",
                            position,
                        ));
                    }
                    open = Some((start, Vec::new()));
                }
                LogEntry::Command(command) => match open.as_mut() {
                    Some((_, commands)) => commands.push(command.command),
                    None => {
                        return Err(LogError::invalid_sequence(
                            "command entry outside a transaction",
                            position,
                        ));
                    }
                },
                LogEntry::Commit(commit) => {
                    let Some((start, commands)) = open.take() else {
                        return Err(LogError::invalid_sequence(
                            "commit entry outside a transaction",
                            position,
                        ));
                    };
                    self.recoverable_end = self.reader.position();
                    return Ok(Some(CommittedTransaction {
                        start,
                        commands,
                        commit,
                        commit_position: position,
                    }));
                }
                LogEntry::CheckPoint(check_point) => {
                    if open.is_some() {
                        return Err(LogError::invalid_sequence(
                            "checkpoint inside an open transaction",
                            position,
                        ));
                    }
                    self.last_checkpoint = Some(check_point);
                    self.recoverable_end = self.reader.position();
                }
                LogEntry::LegacyPrepare { .. } | LogEntry::LegacyDone { .. } | LogEntry::Empty => {}
            }
        }
    }
}

impl Iterator for TransactionCursor<'_> {
    type Item = LogResult<CommittedTransaction>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_transaction().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ReadLogChannel, WriteLogChannel};
    use crate::entry::{LogEntryVersion, LogEntryWriter};
    use txlog_storage::InMemoryBackend;

    fn build(build: impl FnOnce(&mut LogEntryWriter<WriteLogChannel>)) -> InMemoryBackend {
        let channel = WriteLogChannel::new(Box::new(InMemoryBackend::new()), 0).unwrap();
        let mut writer = LogEntryWriter::new(channel).with_version(LogEntryVersion::V3_0);
        build(&mut writer);
        let backend = writer.into_channel().into_inner().unwrap();
        InMemoryBackend::with_data(backend.read_all().unwrap())
    }

    fn cursor(backend: &InMemoryBackend) -> TransactionCursor<'_> {
        let channel = ReadLogChannel::new(backend, 0, 64).unwrap();
        TransactionCursor::new(LogEntryReader::new(channel, 6))
    }

    fn cmd(kind: u8) -> StorageCommand {
        StorageCommand::new(kind, vec![kind]).unwrap()
    }

    #[test]
    fn groups_commands_by_transaction() {
        let mut commit_at = LogPosition::UNSPECIFIED;
        let backend = build(|w| {
            w.write_start_entry(0, 0, 0, 1, b"").unwrap();
            w.write_command_entry(&cmd(1)).unwrap();
            w.write_command_entry(&cmd(2)).unwrap();
            commit_at = w.write_commit_entry(2, 0).unwrap();
            w.write_checkpoint_entry(LogPosition::new(0, 0)).unwrap();
            w.write_start_entry(0, 0, 0, 2, b"").unwrap();
            w.write_commit_entry(3, 0).unwrap();
        });

        let mut cursor = cursor(&backend);
        let first = cursor.next_transaction().unwrap().unwrap();
        assert_eq!(first.tx_id(), 2);
        assert_eq!(first.commands, vec![cmd(1), cmd(2)]);
        assert_eq!(first.commit_position, commit_at);

        let second = cursor.next_transaction().unwrap().unwrap();
        assert_eq!(second.tx_id(), 3);
        assert!(second.commands.is_empty());
        assert_eq!(
            cursor.last_checkpoint().map(|c| c.log_position),
            Some(LogPosition::new(0, 0))
        );
        assert!(cursor.next_transaction().unwrap().is_none());
        assert_eq!(cursor.recoverable_end().byte_offset, backend.data().len() as i64);
    }

    #[test]
    fn unterminated_transaction_is_dropped() {
        let backend = build(|w| {
            w.write_start_entry(0, 0, 0, 1, b"").unwrap();
            w.write_commit_entry(2, 0).unwrap();
            w.write_start_entry(0, 0, 0, 2, b"").unwrap();
            w.write_command_entry(&cmd(1)).unwrap();
        });

        let mut cursor = cursor(&backend);
        let committed: Vec<_> = cursor.by_ref().collect::<LogResult<_>>().unwrap();
        assert_eq!(committed.len(), 1);
        assert!(cursor.recoverable_end().byte_offset < backend.data().len() as i64);
    }

    #[test]
    fn out_of_order_entries_rejected() {
        type Writer = LogEntryWriter<WriteLogChannel>;
        let cases: [(&str, fn(&mut Writer)); 4] = [
            ("command outside", |w: &mut Writer| {
                w.write_command_entry(&cmd(1)).unwrap();
            }),
            ("commit outside", |w: &mut Writer| {
                w.write_commit_entry(2, 0).unwrap();
            }),
            ("nested start", |w: &mut Writer| {
                w.write_start_entry(0, 0, 0, 1, b"").unwrap();
                w.write_start_entry(0, 0, 0, 1, b"").unwrap();
            }),
            ("checkpoint inside", |w: &mut Writer| {
                w.write_start_entry(0, 0, 0, 1, b"").unwrap();
                w.write_checkpoint_entry(LogPosition::new(0, 0)).unwrap();
            }),
        ];

        for (name, case) in cases {
            let backend = build(case);
            let err = cursor(&backend).next_transaction().unwrap_err();
            assert!(
                matches!(err, LogError::InvalidEntrySequence { .. }),
                "{name}: {err}"
            );
        }
    }
}
