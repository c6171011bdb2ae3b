//! Dump command implementation.

use super::open_log;
use crate::error::CliResult;
use crate::Format;
use serde::Serialize;
use std::path::Path;
use txlog_core::{LogConfig, LogEntry, LogEntryReader, LogError, LogPosition};
use txlog_storage::StorageBackend;

/// Log entry representation for output.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct EntryInfo {
    /// Log version of the entry's file.
    pub log_version: i64,
    /// Byte offset of the entry.
    pub offset: i64,
    /// Entry kind.
    pub kind: &'static str,
    /// Entry format generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Transaction id (commit).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<i64>,
    /// Entry time in epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_written: Option<i64>,
    /// Master id (start).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_id: Option<i32>,
    /// Author id (start).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<i32>,
    /// Last committed transaction when started (start).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_committed_tx_id: Option<i64>,
    /// Additional header length (start).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_header_size: Option<usize>,
    /// Start checksum (start).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<i64>,
    /// Command kind byte (command).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_kind: Option<u8>,
    /// Command payload size (command).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_size: Option<usize>,
    /// Checkpoint target (checkpoint).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
}

impl EntryInfo {
    /// Builds the output form of an entry read at `position`.
    pub fn from_entry(entry: &LogEntry, position: LogPosition) -> Self {
        let mut info = Self {
            log_version: position.log_version,
            offset: position.byte_offset,
            kind: entry.kind(),
            version: entry.version().map(|v| v.to_string()),
            ..Self::default()
        };

        match entry {
            LogEntry::Start(start) => {
                info.time_written = Some(start.time_written);
                info.master_id = Some(start.master_id);
                info.author_id = Some(start.author_id);
                info.last_committed_tx_id = Some(start.last_committed_tx_when_started);
                info.additional_header_size = Some(start.additional_header.len());
                info.checksum = Some(start.checksum());
            }
            LogEntry::Command(command) => {
                info.command_kind = Some(command.command.kind());
                info.payload_size = Some(command.command.payload().len());
            }
            LogEntry::Commit(commit) => {
                info.tx_id = Some(commit.tx_id);
                info.time_written = Some(commit.time_written);
            }
            LogEntry::CheckPoint(check_point) => {
                info.checkpoint = Some(check_point.log_position.to_string());
            }
            LogEntry::LegacyPrepare { time_written, .. } => {
                info.time_written = Some(*time_written);
            }
            LogEntry::LegacyDone { .. } | LogEntry::Empty => {}
        }
        info
    }
}

/// Dump output: the entries read, where reading stopped and why.
#[derive(Debug, Serialize)]
pub struct DumpOutput {
    /// Entries in log order.
    pub entries: Vec<EntryInfo>,
    /// Position after the last entry read.
    pub end: String,
    /// Error that stopped the dump, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the dump command.
pub fn run(path: &Path, limit: Option<usize>, verify: bool, format: Format) -> CliResult<()> {
    let backend = open_log(path)?;
    let config = LogConfig::default().verify_checksums(verify);
    let (output, error) = read_entries(&backend, &config, limit)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        Format::Text => print_text_output(&output),
    }

    match error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Reads up to `limit` entries. An entry error ends the dump and is
/// returned next to what was read before it.
pub fn read_entries(
    backend: &dyn StorageBackend,
    config: &LogConfig,
    limit: Option<usize>,
) -> CliResult<(DumpOutput, Option<LogError>)> {
    let mut reader = LogEntryReader::open(backend, config)?;
    let max_entries = limit.unwrap_or(usize::MAX);
    let mut entries = Vec::new();
    let mut error = None;

    while entries.len() < max_entries {
        match reader.read_next() {
            Ok(Some(entry)) => {
                entries.push(EntryInfo::from_entry(&entry, reader.last_entry_position()));
            }
            Ok(None) => break,
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    let output = DumpOutput {
        entries,
        end: reader.position().to_string(),
        error: error.as_ref().map(ToString::to_string),
    };
    Ok((output, error))
}

fn print_text_output(output: &DumpOutput) {
    println!("Log Entries ({} total)", output.entries.len());
    println!("================");
    println!();

    for entry in &output.entries {
        print!("[{:010}] {:10}", entry.offset, entry.kind);
        if let Some(version) = &entry.version {
            print!(" v{version}");
        }
        if let Some(tx_id) = entry.tx_id {
            print!(" tx={tx_id}");
        }
        if let (Some(master), Some(author)) = (entry.master_id, entry.author_id) {
            print!(" master={master} author={author}");
        }
        if let Some(last) = entry.last_committed_tx_id {
            print!(" lastCommitted={last}");
        }
        if let Some(time) = entry.time_written {
            print!(" time={time}");
        }
        if let (Some(kind), Some(size)) = (entry.command_kind, entry.payload_size) {
            print!(" kind={kind} bytes={size}");
        }
        if let Some(target) = &entry.checkpoint {
            print!(" target={target}");
        }
        println!();
    }

    println!();
    println!("End: {}", output.end);
    if let Some(error) = &output.error {
        println!("Stopped: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlog_core::{LogFile, LogHeader, StorageCommand, StoreId};
    use txlog_storage::InMemoryBackend;

    fn sample_log() -> Box<dyn StorageBackend> {
        let header = LogHeader::current(1, 1, &StoreId::generate(0, 1));
        let mut log =
            LogFile::create(Box::new(InMemoryBackend::new()), header, &LogConfig::default())
                .unwrap();
        let w = log.writer();
        w.write_start_entry(1, 2, 10, 1, b"ab").unwrap();
        w.write_command_entry(&StorageCommand::new(4, vec![0; 5]).unwrap()).unwrap();
        w.write_commit_entry(2, 11).unwrap();
        w.write_checkpoint_entry(txlog_core::LogPosition::new(1, 64)).unwrap();
        log.into_backend().unwrap()
    }

    #[test]
    fn dumps_every_entry_kind() {
        let backend = sample_log();
        let (output, error) = read_entries(backend.as_ref(), &LogConfig::default(), None).unwrap();
        assert!(error.is_none());
        let kinds: Vec<_> = output.entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["start", "command", "commit", "checkpoint"]);
        assert_eq!(output.entries[0].offset, 64);
        assert_eq!(output.entries[0].additional_header_size, Some(2));
        assert_eq!(output.entries[1].payload_size, Some(5));
        assert_eq!(output.entries[2].tx_id, Some(2));
    }

    #[test]
    fn limit_stops_early() {
        let backend = sample_log();
        let (output, _) = read_entries(backend.as_ref(), &LogConfig::default(), Some(2)).unwrap();
        assert_eq!(output.entries.len(), 2);
    }

    #[test]
    fn entry_errors_keep_prior_entries() {
        let backend = sample_log();
        let mut bytes = backend.read_all().unwrap();
        bytes.extend_from_slice(&[0xC0, 1, 2]);
        let backend = InMemoryBackend::with_data(bytes);

        let (output, error) = read_entries(&backend, &LogConfig::default(), None).unwrap();
        assert_eq!(output.entries.len(), 4);
        assert!(matches!(error, Some(LogError::UnrecognizedVersion { .. })));
        assert!(output.error.is_some());

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["entries"][3]["kind"], "checkpoint");
        assert!(json["entries"][0].get("tx_id").is_none());
    }
}
