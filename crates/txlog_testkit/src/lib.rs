//! # txlog testkit
//!
//! Test utilities for txlog.
//!
//! This crate provides:
//! - Log fixtures built entry by entry, in memory or in temp files
//! - Property-based generators for transactions of every format generation
//! - Torn-write and corruption helpers for recovery tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use txlog_testkit::prelude::*;
//! use txlog_core::LogEntryVersion;
//!
//! let log = LogBuilder::new(LogEntryVersion::V2_2)
//!     .transaction(&sample_transaction(2))
//!     .build();
//! let recovered = read_transactions(&log.torn_at(log.len() - 1)).unwrap();
//! assert!(recovered.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
