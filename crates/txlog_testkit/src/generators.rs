//! Property-based test generators using proptest.
//!
//! Every strategy is parameterised by the entry generation it targets, so
//! generated values always fit that generation's framing: identifier-framed
//! starts carry at most 255 header bytes, 1.9 starts have no last committed
//! id, and short command framing keeps payloads under 64 KiB.

use bytes::Bytes;
use proptest::prelude::*;
use txlog_core::{
    CommittedTransaction, LogEntryCommit, LogEntryStart, LogEntryVersion, LogPosition,
    StorageCommand, BASE_TX_ID,
};

/// Fixed clock used by generated entries, so sanity checks can be run
/// against it. 2020-01-01T00:00:00Z.
pub const GENERATED_EPOCH_MILLIS: i64 = 1_577_836_800_000;

/// Strategy for any entry generation.
pub fn version_strategy() -> impl Strategy<Value = LogEntryVersion> {
    prop::sample::select(LogEntryVersion::ALL.to_vec())
}

/// Strategy for a storage command. Payloads stay small.
pub fn command_strategy() -> impl Strategy<Value = StorageCommand> {
    (1u8..=u8::MAX, prop::collection::vec(any::<u8>(), 0..256)).prop_filter_map(
        "command kind 0 is reserved",
        |(kind, payload)| StorageCommand::new(kind, Bytes::from(payload)).ok(),
    )
}

/// Strategy for a Start entry of `version`.
pub fn start_strategy(version: LogEntryVersion) -> impl Strategy<Value = LogEntryStart> {
    let max_header = if version.is_identifier_framed() { 255 } else { 512 };
    (
        0i32..16,
        0i32..16,
        0i64..86_400_000,
        BASE_TX_ID..1_000_000,
        prop::collection::vec(any::<u8>(), 0..max_header),
    )
        .prop_map(move |(master_id, author_id, offset, last_tx, additional_header)| {
            LogEntryStart {
                version,
                master_id,
                author_id,
                time_written: GENERATED_EPOCH_MILLIS + offset,
                last_committed_tx_when_started: if version == LogEntryVersion::V1_9 {
                    0
                } else {
                    last_tx
                },
                additional_header,
                start_position: LogPosition::UNSPECIFIED,
            }
        })
}

/// Strategy for one transaction of `version` committing `tx_id`.
pub fn transaction_strategy(
    version: LogEntryVersion,
    tx_id: i64,
) -> impl Strategy<Value = CommittedTransaction> {
    (
        start_strategy(version),
        prop::collection::vec(command_strategy(), 0..4),
        0i64..1_000,
    )
        .prop_map(move |(start, commands, delay)| {
            let commit = LogEntryCommit {
                version,
                tx_id,
                time_written: start.time_written + delay,
            };
            CommittedTransaction {
                start,
                commands,
                commit,
                commit_position: LogPosition::UNSPECIFIED,
            }
        })
}

/// Strategy for a run of transactions of `version` with ids
/// `BASE_TX_ID + 1, BASE_TX_ID + 2, ..`.
pub fn transactions_strategy(
    version: LogEntryVersion,
    max_transactions: usize,
) -> impl Strategy<Value = Vec<CommittedTransaction>> {
    (0..=max_transactions).prop_flat_map(move |count| {
        (0..count)
            .map(|i| transaction_strategy(version, BASE_TX_ID + 1 + i as i64))
            .collect::<Vec<_>>()
    })
}

/// Strategy for a generation together with transactions for it.
pub fn log_strategy(
    max_transactions: usize,
) -> impl Strategy<Value = (LogEntryVersion, Vec<CommittedTransaction>)> {
    version_strategy().prop_flat_map(move |version| {
        (Just(version), transactions_strategy(version, max_transactions))
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
