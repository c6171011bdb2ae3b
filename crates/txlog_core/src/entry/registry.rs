//! Per-generation entry parser tables.
//!
//! Each generation maps type bytes to parsers through a byte-indexed
//! table built at compile time. A table is sized to the largest type byte
//! its generation uses; registering a byte that does not fit, or the same
//! byte twice, fails const evaluation.

use super::codes::{
    CHECK_POINT, COMMAND, DONE, EMPTY, TX_1P_COMMIT, TX_2P_COMMIT, TX_PREPARE, TX_START,
};
use super::parsers::{self, ParseContext};
use super::{LogEntry, LogEntryVersion};
use crate::error::{LogError, LogResult};
use crate::types::LogPosition;
use std::fmt;

/// Signature shared by all entry parsers.
pub type ParseFn = fn(&mut ParseContext<'_>) -> LogResult<Option<LogEntry>>;

/// Decoder for one entry type within one generation.
#[derive(Clone, Copy)]
pub struct EntryParser {
    /// Type byte this parser handles.
    pub type_code: u8,
    /// Decodes the entry body; the version and type bytes are already
    /// consumed.
    pub parse: ParseFn,
    /// Whether the reader drops the entry and moves on.
    pub skip: bool,
}

impl EntryParser {
    const fn new(type_code: u8, parse: ParseFn) -> Self {
        Self {
            type_code,
            parse,
            skip: false,
        }
    }

    const fn skipped(type_code: u8, parse: ParseFn) -> Self {
        Self {
            type_code,
            parse,
            skip: true,
        }
    }
}

impl fmt::Debug for EntryParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryParser")
            .field("type_code", &self.type_code)
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

/// The parsers one generation accepts.
#[derive(Debug)]
pub struct EntryParserSet {
    version: LogEntryVersion,
    parsers: &'static [Option<EntryParser>],
}

impl EntryParserSet {
    /// Generation this set belongs to.
    #[must_use]
    pub fn version(&self) -> LogEntryVersion {
        self.version
    }

    /// Parser for `type_code`, if the generation has one.
    #[must_use]
    pub fn get(&self, type_code: u8) -> Option<&EntryParser> {
        self.parsers.get(usize::from(type_code))?.as_ref()
    }

    /// Parser for `type_code`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntryType` with an unspecified position; the entry
    /// reader reports the real one.
    pub fn entry_parser(&self, type_code: u8) -> LogResult<&EntryParser> {
        self.get(type_code).ok_or(LogError::UnknownEntryType {
            type_code,
            version_code: self.version.code(),
            position: LogPosition::UNSPECIFIED,
        })
    }

    /// Whether `type_code` is part of this generation.
    #[must_use]
    pub fn supports(&self, type_code: u8) -> bool {
        self.get(type_code).is_some()
    }

    /// Registered type bytes in ascending order.
    pub fn type_codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.parsers
            .iter()
            .flatten()
            .map(|parser| parser.type_code)
    }
}

const fn parser_table<const N: usize>(parsers: &[EntryParser]) -> [Option<EntryParser>; N] {
    let mut table: [Option<EntryParser>; N] = [None; N];
    let mut i = 0;
    while i < parsers.len() {
        let code = parsers[i].type_code as usize;
        assert!(code < N, "entry type code does not fit the parser table");
        assert!(table[code].is_none(), "entry type code registered twice");
        table[code] = Some(parsers[i]);
        i += 1;
    }
    table
}

const LEGACY: [Option<EntryParser>; 7] = parser_table(&[
    EntryParser::new(EMPTY, parsers::parse_empty),
    EntryParser::new(TX_START, parsers::parse_legacy_start),
    EntryParser::skipped(TX_PREPARE, parsers::parse_legacy_prepare),
    EntryParser::new(COMMAND, parsers::parse_legacy_command),
    EntryParser::skipped(DONE, parsers::parse_legacy_done),
    EntryParser::new(TX_1P_COMMIT, parsers::parse_legacy_commit),
    EntryParser::new(TX_2P_COMMIT, parsers::parse_legacy_commit),
]);

const TWO_PHASE: [Option<EntryParser>; 7] = parser_table(&[
    EntryParser::new(EMPTY, parsers::parse_empty),
    EntryParser::new(TX_START, parsers::parse_start),
    EntryParser::new(COMMAND, parsers::parse_command),
    EntryParser::new(TX_1P_COMMIT, parsers::parse_commit),
    EntryParser::new(TX_2P_COMMIT, parsers::parse_commit),
]);

const ONE_PHASE: [Option<EntryParser>; 6] = parser_table(&[
    EntryParser::new(EMPTY, parsers::parse_empty),
    EntryParser::new(TX_START, parsers::parse_start),
    EntryParser::new(COMMAND, parsers::parse_command),
    EntryParser::new(TX_1P_COMMIT, parsers::parse_commit),
]);

const CHECKPOINTED: [Option<EntryParser>; 8] = parser_table(&[
    EntryParser::new(EMPTY, parsers::parse_empty),
    EntryParser::new(TX_START, parsers::parse_start),
    EntryParser::new(COMMAND, parsers::parse_command),
    EntryParser::new(TX_1P_COMMIT, parsers::parse_commit),
    EntryParser::new(CHECK_POINT, parsers::parse_check_point),
]);

static V1_9_SET: EntryParserSet = EntryParserSet {
    version: LogEntryVersion::V1_9,
    parsers: &LEGACY,
};
static V2_0_SET: EntryParserSet = EntryParserSet {
    version: LogEntryVersion::V2_0,
    parsers: &LEGACY,
};
static V2_1_SET: EntryParserSet = EntryParserSet {
    version: LogEntryVersion::V2_1,
    parsers: &TWO_PHASE,
};
static V2_2_SET: EntryParserSet = EntryParserSet {
    version: LogEntryVersion::V2_2,
    parsers: &ONE_PHASE,
};
static V2_2_4_SET: EntryParserSet = EntryParserSet {
    version: LogEntryVersion::V2_2_4,
    parsers: &ONE_PHASE,
};
static V2_3_SET: EntryParserSet = EntryParserSet {
    version: LogEntryVersion::V2_3,
    parsers: &ONE_PHASE,
};
static V3_0_SET: EntryParserSet = EntryParserSet {
    version: LogEntryVersion::V3_0,
    parsers: &CHECKPOINTED,
};
static V4_0_SET: EntryParserSet = EntryParserSet {
    version: LogEntryVersion::V4_0,
    parsers: &CHECKPOINTED,
};

pub(crate) fn parser_set(version: LogEntryVersion) -> &'static EntryParserSet {
    match version {
        LogEntryVersion::V1_9 => &V1_9_SET,
        LogEntryVersion::V2_0 => &V2_0_SET,
        LogEntryVersion::V2_1 => &V2_1_SET,
        LogEntryVersion::V2_2 => &V2_2_SET,
        LogEntryVersion::V2_2_4 => &V2_2_4_SET,
        LogEntryVersion::V2_3 => &V2_3_SET,
        LogEntryVersion::V3_0 => &V3_0_SET,
        LogEntryVersion::V4_0 => &V4_0_SET,
    }
}
