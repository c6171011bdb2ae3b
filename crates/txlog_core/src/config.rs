//! Reader and writer configuration.

use crate::types::BASE_TX_ID;

/// Default size of the read-ahead buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for opening, scanning and appending to a log file.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Fail on a file shorter than its header instead of treating it as a
    /// pre-allocated, never-written file.
    pub strict_header: bool,

    /// Verify the per-transaction checksum of formats that carry one.
    pub verify_checksums: bool,

    /// Propagate corruption found while scanning instead of reporting it
    /// and stopping at the last readable transaction.
    pub fail_on_corruption: bool,

    /// Size of the read-ahead buffer used by log channels.
    pub read_buffer_size: usize,

    /// Whether to sync the backend after every flush.
    pub sync_on_write: bool,

    /// Transaction id of the empty store, used by sanity checks.
    pub base_tx_id: i64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            strict_header: false,
            verify_checksums: true,
            fail_on_corruption: true,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            sync_on_write: true,
            base_tx_id: BASE_TX_ID,
        }
    }
}

impl LogConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether an incomplete header is an error.
    #[must_use]
    pub const fn strict_header(mut self, value: bool) -> Self {
        self.strict_header = value;
        self
    }

    /// Sets whether transaction checksums are verified on read.
    #[must_use]
    pub const fn verify_checksums(mut self, value: bool) -> Self {
        self.verify_checksums = value;
        self
    }

    /// Sets whether scanning propagates corruption errors.
    #[must_use]
    pub const fn fail_on_corruption(mut self, value: bool) -> Self {
        self.fail_on_corruption = value;
        self
    }

    /// Sets the read-ahead buffer size. Values below 16 bytes are raised
    /// to 16 so a legacy header always fits.
    #[must_use]
    pub const fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = if size < 16 { 16 } else { size };
        self
    }

    /// Sets whether to sync on every flush.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the base transaction id used by sanity checks.
    #[must_use]
    pub const fn base_tx_id(mut self, id: i64) -> Self {
        self.base_tx_id = id;
        self
    }
}
