//! Storage commands carried by COMMAND entries.
//!
//! The log treats commands as opaque: a kind byte and a payload. Kind
//! [`NONE_COMMAND`] is reserved; reading it means the rest of the record
//! was never written.

use crate::channel::{ReadableChannel, WritableChannel};
use crate::entry::LogEntryVersion;
use crate::error::{LogError, LogResult};
use bytes::Bytes;
use std::fmt;

/// Reserved command kind marking "no more meaningful data".
pub const NONE_COMMAND: u8 = 0;

/// One opaque storage mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageCommand {
    kind: u8,
    payload: Bytes,
}

impl StorageCommand {
    /// Creates a command.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for the reserved kind [`NONE_COMMAND`].
    pub fn new(kind: u8, payload: impl Into<Bytes>) -> LogResult<Self> {
        if kind == NONE_COMMAND {
            return Err(LogError::invalid_argument(
                "command kind 0 is reserved for torn records",
            ));
        }
        Ok(Self {
            kind,
            payload: payload.into(),
        })
    }

    /// Command kind byte.
    #[must_use]
    pub fn kind(&self) -> u8 {
        self.kind
    }

    /// Command payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

impl fmt::Display for StorageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command[kind={}, {} bytes]", self.kind, self.payload.len())
    }
}

/// Decodes commands from a channel.
pub trait CommandReader: Send + Sync {
    /// Reads one command.
    ///
    /// Returns `Ok(None)` when the record turns out to be torn.
    ///
    /// # Errors
    ///
    /// Returns `ReadPastEnd` if the channel runs out, or `Corrupted` for
    /// an impossible length.
    fn read(&self, channel: &mut dyn ReadableChannel) -> LogResult<Option<StorageCommand>>;
}

/// Encodes commands to a channel.
pub trait CommandWriter: Send + Sync {
    /// Writes one command.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the payload does not fit the framing.
    fn write(&self, command: &StorageCommand, channel: &mut dyn WritableChannel) -> LogResult<()>;
}

/// Picks the command reader for an entry version.
pub trait CommandReaderFactory: Send + Sync {
    /// Reader for `version`, or `None` if commands of that version
    /// cannot be decoded.
    fn by_version(&self, version: LogEntryVersion) -> Option<&dyn CommandReader>;
}

/// Length framing used for command payloads.
///
/// ```text
/// Short: [kind u8][len u16][payload]
/// Long:  [kind u8][len i32][payload]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFormat {
    /// 16-bit unsigned length, used up to 2.1.
    Short,
    /// 32-bit signed length, used from 2.2 on.
    Long,
}

impl CommandFormat {
    /// Largest payload this framing can describe.
    #[must_use]
    pub const fn max_payload(self) -> usize {
        match self {
            Self::Short => u16::MAX as usize,
            Self::Long => i32::MAX as usize,
        }
    }
}

impl CommandReader for CommandFormat {
    fn read(&self, channel: &mut dyn ReadableChannel) -> LogResult<Option<StorageCommand>> {
        let start = channel.position();
        let kind = channel.get_u8()?;
        if kind == NONE_COMMAND {
            return Ok(None);
        }
        let len = match self {
            Self::Short => usize::from(channel.get_u16()?),
            Self::Long => {
                let len = channel.get_i32()?;
                usize::try_from(len).map_err(|_| {
                    LogError::corrupted(format!("negative command length {len}"), start)
                })?
            }
        };
        let payload = channel.get_bytes(len)?;
        Ok(Some(StorageCommand {
            kind,
            payload: Bytes::from(payload),
        }))
    }
}

impl CommandWriter for CommandFormat {
    fn write(&self, command: &StorageCommand, channel: &mut dyn WritableChannel) -> LogResult<()> {
        let len = command.payload.len();
        if len > self.max_payload() {
            return Err(LogError::invalid_argument(format!(
                "command payload of {len} bytes exceeds {self:?} framing"
            )));
        }
        channel.put_u8(command.kind)?;
        match self {
            Self::Short => channel.put_u16(len as u16)?,
            Self::Long => channel.put_i32(len as i32)?,
        }
        channel.put_bytes(&command.payload)
    }
}

static SHORT_COMMANDS: CommandFormat = CommandFormat::Short;
static LONG_COMMANDS: CommandFormat = CommandFormat::Long;

/// Command readers for the built-in framing of every entry version.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardCommandReaders;

impl CommandReaderFactory for StandardCommandReaders {
    fn by_version(&self, version: LogEntryVersion) -> Option<&dyn CommandReader> {
        Some(match version.command_format() {
            CommandFormat::Short => &SHORT_COMMANDS,
            CommandFormat::Long => &LONG_COMMANDS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ReadLogChannel, WriteLogChannel};
    use txlog_storage::InMemoryBackend;

    fn encode(format: CommandFormat, command: &StorageCommand) -> Vec<u8> {
        let mut channel = WriteLogChannel::new(Box::new(InMemoryBackend::new()), 0).unwrap();
        format.write(command, &mut channel).unwrap();
        let backend = channel.into_inner().unwrap();
        backend.read_all().unwrap()
    }

    #[test]
    fn reserved_kind_rejected() {
        assert!(StorageCommand::new(NONE_COMMAND, vec![1]).is_err());
    }

    #[test]
    fn framing_differs_by_format() {
        let command = StorageCommand::new(9, vec![1, 2, 3]).unwrap();
        assert_eq!(encode(CommandFormat::Short, &command), vec![9, 0, 3, 1, 2, 3]);
        assert_eq!(
            encode(CommandFormat::Long, &command),
            vec![9, 0, 0, 0, 3, 1, 2, 3]
        );
    }

    #[test]
    fn reads_back_written_command() {
        let command = StorageCommand::new(4, b"node:17".to_vec()).unwrap();
        for format in [CommandFormat::Short, CommandFormat::Long] {
            let backend = InMemoryBackend::with_data(encode(format, &command));
            let mut channel = ReadLogChannel::new(&backend, 0, 16).unwrap();
            assert_eq!(format.read(&mut channel).unwrap(), Some(command.clone()));
        }
    }

    #[test]
    fn none_kind_reads_as_torn() {
        let backend = InMemoryBackend::with_data(vec![NONE_COMMAND, 0, 0, 0, 0]);
        let mut channel = ReadLogChannel::new(&backend, 0, 16).unwrap();
        assert_eq!(CommandFormat::Long.read(&mut channel).unwrap(), None);
    }

    #[test]
    fn negative_length_is_corruption() {
        let backend = InMemoryBackend::with_data(vec![5, 0xFF, 0xFF, 0xFF, 0xFE]);
        let mut channel = ReadLogChannel::new(&backend, 0, 16).unwrap();
        assert!(matches!(
            CommandFormat::Long.read(&mut channel),
            Err(LogError::Corrupted { .. })
        ));
    }

    #[test]
    fn oversized_short_payload_rejected() {
        let command = StorageCommand::new(1, vec![0u8; 70_000]).unwrap();
        let mut channel = WriteLogChannel::new(Box::new(InMemoryBackend::new()), 0).unwrap();
        assert!(matches!(
            CommandFormat::Short.write(&command, &mut channel),
            Err(LogError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn standard_readers_follow_version_framing() {
        let readers = StandardCommandReaders;
        for version in LogEntryVersion::ALL {
            assert!(readers.by_version(version).is_some());
        }
        assert_eq!(LogEntryVersion::V2_1.command_format(), CommandFormat::Short);
        assert_eq!(LogEntryVersion::V2_2.command_format(), CommandFormat::Long);
    }
}
