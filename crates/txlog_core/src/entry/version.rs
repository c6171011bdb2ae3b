//! Entry format generations and version byte dispatch.
//!
//! Entries written since 2.1 start with a negative version byte. Older
//! entries have none and are read under code 0, which two generations
//! share; the file's header format tells them apart.

use super::registry::{self, EntryParserSet};
use crate::command::CommandFormat;
use crate::error::{LogError, LogResult};
use crate::header::{
    LOG_VERSION_1_9, LOG_VERSION_2_0, LOG_VERSION_2_1, LOG_VERSION_2_2, LOG_VERSION_2_3,
    LOG_VERSION_4_0,
};
use crate::types::LogPosition;
use std::fmt;

/// One generation of the entry format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogEntryVersion {
    /// 1.9: identifier-framed, no version byte.
    V1_9,
    /// 2.0: as 1.9, Start also records the last committed transaction.
    V2_0,
    /// 2.1: first generation with a version byte.
    V2_1,
    /// 2.2: 32-bit command lengths, no two-phase commit.
    V2_2,
    /// 2.2.4: same layout as 2.2.
    V2_2_4,
    /// 2.3: same layout as 2.2.
    V2_3,
    /// 3.0: adds checkpoints.
    V3_0,
    /// 4.0: commit entries carry a transaction checksum.
    V4_0,
}

use LogEntryVersion::{V1_9, V2_0, V2_1, V2_2, V2_2_4, V2_3, V3_0, V4_0};

/// Candidates for negative version codes, indexed by magnitude.
const NEGATIVE: [&[LogEntryVersion]; 7] = [
    &[],
    &[V2_1],
    &[V2_2],
    &[V2_2_4],
    &[V2_3],
    &[V3_0],
    &[V4_0],
];

/// Candidates for non-negative version codes. Only 0 is in use.
const POSITIVE: [&[LogEntryVersion]; 1] = [&[V1_9, V2_0]];

impl LogEntryVersion {
    /// Generation written by default.
    pub const CURRENT: Self = V4_0;

    /// Every generation, oldest first.
    pub const ALL: [Self; 8] = [V1_9, V2_0, V2_1, V2_2, V2_2_4, V2_3, V3_0, V4_0];

    /// Version byte of this generation.
    #[must_use]
    pub const fn code(self) -> i8 {
        match self {
            V1_9 | V2_0 => 0,
            V2_1 => -1,
            V2_2 => -2,
            V2_2_4 => -3,
            V2_3 => -4,
            V3_0 => -5,
            V4_0 => -6,
        }
    }

    /// Log header format of files this generation was written to.
    #[must_use]
    pub const fn log_header_format(self) -> u8 {
        match self {
            V1_9 => LOG_VERSION_1_9,
            V2_0 => LOG_VERSION_2_0,
            V2_1 => LOG_VERSION_2_1,
            V2_2 | V2_2_4 => LOG_VERSION_2_2,
            V2_3 | V3_0 => LOG_VERSION_2_3,
            V4_0 => LOG_VERSION_4_0,
        }
    }

    /// Whether entries start with a version byte.
    #[must_use]
    pub const fn writes_version_byte(self) -> bool {
        self.code() < 0
    }

    /// Whether entries are framed by a per-transaction identifier.
    #[must_use]
    pub const fn is_identifier_framed(self) -> bool {
        matches!(self, V1_9 | V2_0)
    }

    /// Whether commit entries end with a transaction checksum.
    #[must_use]
    pub const fn has_commit_checksum(self) -> bool {
        matches!(self, V4_0)
    }

    /// Length framing of command payloads.
    #[must_use]
    pub const fn command_format(self) -> CommandFormat {
        match self {
            V1_9 | V2_0 | V2_1 => CommandFormat::Short,
            _ => CommandFormat::Long,
        }
    }

    /// Parsers accepted by this generation.
    #[must_use]
    pub fn parsers(self) -> &'static EntryParserSet {
        registry::parser_set(self)
    }

    /// Release name, e.g. `2.2.4`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            V1_9 => "1.9",
            V2_0 => "2.0",
            V2_1 => "2.1",
            V2_2 => "2.2",
            V2_2_4 => "2.2.4",
            V2_3 => "2.3",
            V3_0 => "3.0",
            V4_0 => "4.0",
        }
    }

    /// Newest generation written to files with `header_format`.
    #[must_use]
    pub fn latest_for_header_format(header_format: u8) -> Option<Self> {
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|version| version.log_header_format() == header_format)
    }

    /// Looks up the generation for a version byte.
    ///
    /// `header_format` only matters when several generations share the
    /// code; a single candidate is returned without looking at it.
    #[must_use]
    pub fn lookup(version_code: i8, header_format: u8) -> Option<Self> {
        let index = usize::from(version_code.unsigned_abs());
        let candidates = if version_code < 0 {
            NEGATIVE.get(index)
        } else {
            POSITIVE.get(index)
        }?;

        match candidates {
            [only] => Some(*only),
            _ => candidates
                .iter()
                .copied()
                .find(|candidate| candidate.log_header_format() == header_format),
        }
    }

    /// Like [`lookup`](Self::lookup), failing for unknown codes.
    ///
    /// # Errors
    ///
    /// Returns `UnrecognizedVersion` with an unspecified position; the
    /// entry reader reports the real one.
    pub fn by_version(version_code: i8, header_format: u8) -> LogResult<Self> {
        Self::lookup(version_code, header_format).ok_or(LogError::UnrecognizedVersion {
            version_code,
            header_format,
            position: LogPosition::UNSPECIFIED,
        })
    }
}

impl fmt::Display for LogEntryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
