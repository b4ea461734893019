//! Run ledger: one CSV row per finished run, successful or not.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::RunReport;

#[derive(Debug, Default, Serialize)]
pub struct LedgerRow {
    pub recorded_at: DateTime<Utc>,
    pub run_date: Option<NaiveDate>,
    pub status: String,
    pub attempts: u32,
    pub rows: Option<usize>,
    pub long_rides: Option<usize>,
    pub late_starts: Option<usize>,
    pub output_key: Option<String>,
    pub partitions: Option<usize>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl LedgerRow {
    pub fn from_report(report: &RunReport, attempts: u32) -> Self {
        LedgerRow {
            recorded_at: Utc::now(),
            run_date: Some(report.run_date),
            status: "success".to_string(),
            attempts,
            rows: Some(report.rows),
            long_rides: Some(report.flags.long_rides),
            late_starts: Some(report.flags.late_starts),
            output_key: Some(report.output_key.clone()),
            partitions: Some(report.partitions),
            ..Default::default()
        }
    }

    pub fn from_error(run_date: NaiveDate, err: &PipelineError, attempts: u32) -> Self {
        LedgerRow {
            recorded_at: Utc::now(),
            run_date: Some(run_date),
            status: "failed".to_string(),
            attempts,
            error_kind: Some(err.kind().to_string()),
            error_message: Some(err.to_string()),
            ..Default::default()
        }
    }
}

/// Appends a [`LedgerRow`] to the CSV file at `path`.
///
/// Creates the file with headers if it does not already exist.
pub fn append_run(path: &Path, row: &LedgerRow) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending ledger row");

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(row)?;
    writer.flush()?;

    Ok(())
}
