//! Entry type bytes.
//!
//! The same byte means the same entry kind in every format generation;
//! which bytes a generation accepts is decided by its parser set.

/// Zero-filled, never-written space.
pub const EMPTY: u8 = 0;
/// Transaction start.
pub const TX_START: u8 = 1;
/// Legacy prepare marker.
pub const TX_PREPARE: u8 = 2;
/// One storage command.
pub const COMMAND: u8 = 3;
/// Legacy done marker.
pub const DONE: u8 = 4;
/// One-phase commit.
pub const TX_1P_COMMIT: u8 = 5;
/// Two-phase commit.
pub const TX_2P_COMMIT: u8 = 6;
/// Checkpoint.
pub const CHECK_POINT: u8 = 7;

/// Human-readable name of a type byte.
#[must_use]
pub const fn type_name(type_code: u8) -> &'static str {
    match type_code {
        EMPTY => "EMPTY",
        TX_START => "TX_START",
        TX_PREPARE => "TX_PREPARE",
        COMMAND => "COMMAND",
        DONE => "DONE",
        TX_1P_COMMIT => "TX_1P_COMMIT",
        TX_2P_COMMIT => "TX_2P_COMMIT",
        CHECK_POINT => "CHECK_POINT",
        _ => "UNKNOWN",
    }
}
