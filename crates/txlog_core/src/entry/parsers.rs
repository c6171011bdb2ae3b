//! Entry body decoders for every format generation.
//!
//! Parsers run after the reader has consumed the version and type bytes.
//! Identifier-framed generations (1.9, 2.0) prefix every body with the
//! transaction identifier; later generations drop it.

use super::{
    LogEntry, LogEntryCheckPoint, LogEntryCommand, LogEntryCommit, LogEntryStart, LogEntryVersion,
};
use crate::channel::ReadableChannel;
use crate::command::CommandReaderFactory;
use crate::error::{LogError, LogResult};
use crate::types::LogPosition;

/// Everything a parser needs besides the bytes.
pub struct ParseContext<'a> {
    /// Generation resolved for the entry.
    pub version: LogEntryVersion,
    /// Channel positioned at the entry body.
    pub channel: &'a mut dyn ReadableChannel,
    /// Position of the entry's first byte.
    pub start_position: LogPosition,
    /// Source of command decoders.
    pub commands: &'a dyn CommandReaderFactory,
    /// Whether a transaction checksum found in this entry is checked.
    pub verify_checksum: bool,
}

pub(crate) fn parse_empty(_ctx: &mut ParseContext<'_>) -> LogResult<Option<LogEntry>> {
    Ok(Some(LogEntry::Empty))
}

pub(crate) fn parse_legacy_start(ctx: &mut ParseContext<'_>) -> LogResult<Option<LogEntry>> {
    let channel = &mut *ctx.channel;
    let _identifier = channel.get_i32()?;
    let _format_id = channel.get_i32()?;
    let gid_len = usize::from(channel.get_u8()?);
    let bqual_len = usize::from(channel.get_u8()?);
    let global_id = channel.get_bytes(gid_len)?;
    channel.get_bytes(bqual_len)?;
    let master_id = channel.get_i32()?;
    let author_id = channel.get_i32()?;
    let time_written = channel.get_i64()?;
    let last_committed_tx_when_started = if ctx.version == LogEntryVersion::V1_9 {
        0
    } else {
        channel.get_i64()?
    };

    Ok(Some(LogEntry::Start(LogEntryStart {
        version: ctx.version,
        master_id,
        author_id,
        time_written,
        last_committed_tx_when_started,
        additional_header: global_id,
        start_position: ctx.start_position,
    })))
}

pub(crate) fn parse_legacy_prepare(ctx: &mut ParseContext<'_>) -> LogResult<Option<LogEntry>> {
    let identifier = ctx.channel.get_i32()?;
    let time_written = ctx.channel.get_i64()?;
    Ok(Some(LogEntry::LegacyPrepare {
        identifier,
        time_written,
    }))
}

pub(crate) fn parse_legacy_done(ctx: &mut ParseContext<'_>) -> LogResult<Option<LogEntry>> {
    let identifier = ctx.channel.get_i32()?;
    Ok(Some(LogEntry::LegacyDone { identifier }))
}

pub(crate) fn parse_legacy_command(ctx: &mut ParseContext<'_>) -> LogResult<Option<LogEntry>> {
    let _identifier = ctx.channel.get_i32()?;
    parse_command(ctx)
}

pub(crate) fn parse_legacy_commit(ctx: &mut ParseContext<'_>) -> LogResult<Option<LogEntry>> {
    let _identifier = ctx.channel.get_i32()?;
    let tx_id = ctx.channel.get_i64()?;
    let time_written = ctx.channel.get_i64()?;
    Ok(Some(LogEntry::Commit(LogEntryCommit {
        version: ctx.version,
        tx_id,
        time_written,
    })))
}

pub(crate) fn parse_start(ctx: &mut ParseContext<'_>) -> LogResult<Option<LogEntry>> {
    let channel = &mut *ctx.channel;
    let master_id = channel.get_i32()?;
    let author_id = channel.get_i32()?;
    let time_written = channel.get_i64()?;
    let last_committed_tx_when_started = channel.get_i64()?;
    let header_len = channel.get_i32()?;
    let header_len = usize::try_from(header_len).map_err(|_| {
        LogError::corrupted(
            format!("negative additional header length {header_len}"),
            ctx.start_position,
        )
    })?;
    let additional_header = channel.get_bytes(header_len)?;

    Ok(Some(LogEntry::Start(LogEntryStart {
        version: ctx.version,
        master_id,
        author_id,
        time_written,
        last_committed_tx_when_started,
        additional_header,
        start_position: ctx.start_position,
    })))
}

pub(crate) fn parse_command(ctx: &mut ParseContext<'_>) -> LogResult<Option<LogEntry>> {
    let reader = ctx
        .commands
        .by_version(ctx.version)
        .ok_or(LogError::UnsupportedEntry {
            entry: "command",
            version: ctx.version,
        })?;

    let command = match reader.read(&mut *ctx.channel) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(None),
        Err(LogError::Corrupted { message, .. }) => {
            return Err(LogError::corrupted(message, ctx.start_position));
        }
        Err(e) => return Err(e),
    };

    Ok(Some(LogEntry::Command(LogEntryCommand {
        version: ctx.version,
        command,
    })))
}

pub(crate) fn parse_commit(ctx: &mut ParseContext<'_>) -> LogResult<Option<LogEntry>> {
    let tx_id = ctx.channel.get_i64()?;
    let time_written = ctx.channel.get_i64()?;

    if ctx.version.has_commit_checksum() {
        let computed = ctx.channel.checksum();
        let stored = ctx.channel.get_i32()? as u32;
        if ctx.verify_checksum && stored != computed {
            return Err(LogError::ChecksumMismatch {
                expected: stored,
                actual: computed,
                position: ctx.start_position,
            });
        }
    }

    Ok(Some(LogEntry::Commit(LogEntryCommit {
        version: ctx.version,
        tx_id,
        time_written,
    })))
}

pub(crate) fn parse_check_point(ctx: &mut ParseContext<'_>) -> LogResult<Option<LogEntry>> {
    let log_version = ctx.channel.get_i64()?;
    let byte_offset = ctx.channel.get_i64()?;
    Ok(Some(LogEntry::CheckPoint(LogEntryCheckPoint {
        version: ctx.version,
        log_position: LogPosition::new(log_version, byte_offset),
    })))
}
