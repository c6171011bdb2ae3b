//! Plausibility checks for decoded entries.
//!
//! A torn or garbage tail can decode into entries that are structurally
//! valid but meaningless. These checks flag values no real store writes.
//! They are advisory: a failing entry is reported, never rejected.

use crate::config::LogConfig;
use crate::entry::LogEntry;
use crate::types::{LogPosition, BASE_TX_ID};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Server ids at or above this are not plausible.
pub const UNREASONABLY_HIGH_SERVER_ID: i32 = 10_000_000;

/// Start times further than this from now are not plausible (30 years).
pub const UNREASONABLY_LONG_TIME_MILLIS: i64 = 30 * 365 * 24 * 60 * 60 * 1000;

/// Checks entries against plausibility bounds.
#[derive(Debug, Clone, Copy)]
pub struct SanityChecker {
    base_tx_id: i64,
}

impl Default for SanityChecker {
    fn default() -> Self {
        Self::new(BASE_TX_ID)
    }
}

impl SanityChecker {
    /// Creates a checker for a store whose first transaction follows
    /// `base_tx_id`.
    #[must_use]
    pub const fn new(base_tx_id: i64) -> Self {
        Self { base_tx_id }
    }

    /// Creates a checker from configuration.
    #[must_use]
    pub const fn from_config(config: &LogConfig) -> Self {
        Self::new(config.base_tx_id)
    }

    /// Whether `entry` looks like something a store wrote, judged against
    /// the current time.
    #[must_use]
    pub fn log_entry_makes_sense(&self, entry: &LogEntry) -> bool {
        self.log_entry_makes_sense_at(entry, now_millis())
    }

    /// Like [`log_entry_makes_sense`](Self::log_entry_makes_sense) with an
    /// explicit clock.
    #[must_use]
    pub fn log_entry_makes_sense_at(&self, entry: &LogEntry, now_millis: i64) -> bool {
        self.problem_at(entry, now_millis).is_none()
    }

    /// Describes why `entry` is implausible, or `None` if it is fine.
    #[must_use]
    pub fn problem_at(&self, entry: &LogEntry, now_millis: i64) -> Option<String> {
        match entry {
            LogEntry::Commit(commit) if commit.tx_id <= self.base_tx_id => Some(format!(
                "commit of tx {} is not after base tx {}",
                commit.tx_id, self.base_tx_id
            )),
            LogEntry::Start(start) => {
                if !server_id_makes_sense(start.master_id) {
                    Some(format!("master id {} out of range", start.master_id))
                } else if !server_id_makes_sense(start.author_id) {
                    Some(format!("author id {} out of range", start.author_id))
                } else if !time_makes_sense(start.time_written, now_millis) {
                    Some(format!(
                        "start time {} is too far from {now_millis}",
                        start.time_written
                    ))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Checks `entry` and records a warning in `report` if it fails.
    pub fn check(
        &self,
        entry: &LogEntry,
        position: LogPosition,
        now_millis: i64,
        report: &mut SanityReport,
    ) {
        if let Some(problem) = self.problem_at(entry, now_millis) {
            warn!(%position, entry = entry.kind(), %problem, "implausible log entry");
            report.warnings.push(SanityWarning {
                position,
                entry: entry.kind(),
                problem,
            });
        }
    }
}

fn server_id_makes_sense(id: i32) -> bool {
    (0..UNREASONABLY_HIGH_SERVER_ID).contains(&id)
}

fn time_makes_sense(time: i64, now: i64) -> bool {
    time.abs_diff(now) <= UNREASONABLY_LONG_TIME_MILLIS as u64
}

/// Current time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// One implausible entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanityWarning {
    /// Where the entry starts.
    pub position: LogPosition,
    /// Entry kind.
    pub entry: &'static str,
    /// What was wrong.
    pub problem: String,
}

impl fmt::Display for SanityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.entry, self.position, self.problem)
    }
}

/// Warnings collected over a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanityReport {
    warnings: Vec<SanityWarning>,
}

impl SanityReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing was flagged.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Flagged entries in scan order.
    #[must_use]
    pub fn warnings(&self) -> &[SanityWarning] {
        &self.warnings
    }
}
