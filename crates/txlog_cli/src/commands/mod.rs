//! CLI command implementations.

pub mod check;
pub mod dump;
pub mod header;

use crate::error::{CliError, CliResult};
use std::path::Path;
use txlog_storage::FileBackend;

/// Opens an existing log file for reading.
pub(crate) fn open_log(path: &Path) -> CliResult<FileBackend> {
    if !path.exists() {
        return Err(CliError::NotFound(path.to_path_buf()));
    }
    Ok(FileBackend::open_existing(path)?)
}
