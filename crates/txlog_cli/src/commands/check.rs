//! Check command implementation.

use super::open_log;
use crate::error::{CliError, CliResult};
use crate::Format;
use serde::Serialize;
use std::path::Path;
use txlog_core::{LogConfig, RecoveryReport, RecoveryScanner};
use txlog_storage::StorageBackend;

/// Check result for output.
#[derive(Debug, Serialize)]
pub struct CheckResult {
    /// Whether a header was found.
    pub has_header: bool,
    /// File size in bytes.
    pub file_size: u64,
    /// Complete transactions.
    pub committed_transactions: usize,
    /// Last complete transaction id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_committed_tx_id: Option<i64>,
    /// Last checkpoint target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<String>,
    /// End of the recoverable content.
    pub recoverable_end: String,
    /// Non-zero bytes past the recoverable end.
    pub unreadable_bytes: u64,
    /// Corruption that stopped the scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corruption: Option<String>,
    /// Implausible entries.
    pub warnings: Vec<String>,
}

impl CheckResult {
    fn from_report(report: &RecoveryReport) -> Self {
        Self {
            has_header: report.header.is_some(),
            file_size: report.file_size,
            committed_transactions: report.committed_transactions,
            last_committed_tx_id: report.last_committed_tx_id,
            last_checkpoint: report.last_checkpoint.map(|p| p.to_string()),
            recoverable_end: report.recoverable_end.to_string(),
            unreadable_bytes: report.unreadable_bytes,
            corruption: report
                .corruption
                .as_ref()
                .map(|c| format!("{} at {}", c.message, c.position)),
            warnings: report.sanity.warnings().iter().map(ToString::to_string).collect(),
        }
    }

    /// Problems that fail the check. In strict mode implausible entries
    /// count too.
    pub fn failures(&self, strict: bool) -> Vec<String> {
        let mut failures = Vec::new();
        if let Some(corruption) = &self.corruption {
            failures.push(format!("corruption: {corruption}"));
        }
        if self.unreadable_bytes > 0 {
            failures.push(format!(
                "{} unreadable bytes after {}",
                self.unreadable_bytes, self.recoverable_end
            ));
        }
        if strict && !self.warnings.is_empty() {
            failures.push(format!("{} implausible entries", self.warnings.len()));
        }
        failures
    }
}

/// Runs the check command.
pub fn run(path: &Path, strict: bool, format: Format) -> CliResult<()> {
    let backend = open_log(path)?;
    let result = check(&backend, strict)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }

    let failures = result.failures(strict);
    if failures.is_empty() {
        println!("✓ Log check passed");
        Ok(())
    } else {
        println!("✗ Log check failed");
        Err(CliError::CheckFailed(failures.join("; ")))
    }
}

/// Scans `backend`, reporting corruption instead of failing on it.
pub fn check(backend: &dyn StorageBackend, strict: bool) -> CliResult<CheckResult> {
    let config = LogConfig::default()
        .strict_header(strict)
        .fail_on_corruption(false);
    let report = RecoveryScanner::scan(backend, &config)?;
    Ok(CheckResult::from_report(&report))
}

fn print_text_output(result: &CheckResult) {
    println!("Log Check");
    println!("=========");
    println!("Header:                 {}", if result.has_header { "present" } else { "missing" });
    println!("File size:              {} bytes", result.file_size);
    println!("Committed transactions: {}", result.committed_transactions);
    if let Some(tx) = result.last_committed_tx_id {
        println!("Last committed tx:      {tx}");
    }
    if let Some(check_point) = &result.last_checkpoint {
        println!("Last checkpoint:        {check_point}");
    }
    println!("Recoverable end:        {}", result.recoverable_end);
    println!("Unreadable bytes:       {}", result.unreadable_bytes);
    if let Some(corruption) = &result.corruption {
        println!("Corruption:             {corruption}");
    }
    if !result.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &result.warnings {
            println!("  - {warning}");
        }
    }
    println!();
}
