//! Header command implementation.

use super::open_log;
use crate::error::CliResult;
use crate::Format;
use serde::Serialize;
use std::path::Path;
use txlog_core::{read_log_header, LogEntryVersion, LogHeader};

/// Header representation for output.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HeaderInfo {
    /// Header format byte.
    pub format_version: u8,
    /// Log file sequence number.
    pub log_version: i64,
    /// Last transaction committed before the file.
    pub last_committed_tx_id: i64,
    /// Header size in bytes.
    pub header_size: usize,
    /// Newest entry generation written to files of this format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_version: Option<String>,
    /// Store identity, for formats that carry it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<StoreIdInfo>,
}

/// Store identity representation for output.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StoreIdInfo {
    /// Creation time in epoch milliseconds.
    pub creation_time: i64,
    /// Random discriminator.
    pub random_id: i64,
    /// Store format version.
    pub store_version: i64,
    /// Last upgrade time in epoch milliseconds.
    pub upgrade_time: i64,
    /// Transaction id of the last upgrade.
    pub upgrade_tx_id: i64,
}

impl HeaderInfo {
    /// Builds the output form of a decoded header.
    pub fn from_header(header: &LogHeader) -> Self {
        Self {
            format_version: header.format_version,
            log_version: header.log_version,
            last_committed_tx_id: header.last_committed_tx_id,
            header_size: header.size().unwrap_or(0),
            entry_version: LogEntryVersion::latest_for_header_format(header.format_version)
                .map(|v| v.to_string()),
            store_id: header.store_id.map(|id| StoreIdInfo {
                creation_time: id.creation_time,
                random_id: id.random_id,
                store_version: id.store_version,
                upgrade_time: id.upgrade_time,
                upgrade_tx_id: id.upgrade_tx_id,
            }),
        }
    }
}

/// Runs the header command.
pub fn run(path: &Path, format: Format) -> CliResult<()> {
    let backend = open_log(path)?;
    let header = read_log_header(&backend, false)?;
    let info = header.as_ref().map(HeaderInfo::from_header);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        Format::Text => match &info {
            Some(info) => print_text_output(info),
            None => println!("No header: the file is empty or was never written"),
        },
    }
    Ok(())
}

fn print_text_output(info: &HeaderInfo) {
    println!("Log Header");
    println!("==========");
    println!("Format version:      {}", info.format_version);
    println!("Log version:         {}", info.log_version);
    println!("Last committed tx:   {}", info.last_committed_tx_id);
    println!("Header size:         {} bytes", info.header_size);
    if let Some(version) = &info.entry_version {
        println!("Entry version:       {version}");
    }
    if let Some(store) = &info.store_id {
        println!("Store creation time: {}", store.creation_time);
        println!("Store random id:     {:x}", store.random_id);
        println!("Store version:       {}", store.store_version);
        println!("Upgrade time:        {}", store.upgrade_time);
        println!("Upgrade tx:          {}", store.upgrade_tx_id);
    }
}
