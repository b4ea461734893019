//! Trip table loading and enrichment.
//!
//! Reads the delimited trip file with a fixed typed schema, parses the two
//! timestamp columns with an inferred format, derives `duration`,
//! `duration_seconds` and `week`, and keeps the first row per `ride_id`.
//!
//! Rides whose `ended_at` precedes `started_at` are kept as they are and
//! carry a negative `duration_seconds`.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// The thirteen columns every trip file must carry, with their types.
pub const TRIP_COLUMNS: [&str; 13] = [
    "ride_id",
    "rideable_type",
    "started_at",
    "ended_at",
    "start_station_name",
    "start_station_id",
    "end_station_name",
    "end_station_id",
    "start_lat",
    "start_lng",
    "end_lat",
    "end_lng",
    "member_casual",
];

fn column_type(name: &str) -> DataType {
    match name {
        "start_station_id" | "end_station_id" => DataType::Int64,
        "start_lat" | "start_lng" | "end_lat" | "end_lng" => DataType::Float64,
        _ => DataType::String,
    }
}

/// Read schema for the trip file. Timestamps are read as strings and parsed
/// afterwards so their format can be inferred.
pub fn trip_schema() -> Schema {
    Schema::from_iter(
        TRIP_COLUMNS
            .iter()
            .map(|name| Field::new((*name).into(), column_type(name))),
    )
}

/// Fails with a parse error naming every expected column absent from the
/// file's header row.
fn check_columns(path: &Path) -> Result<()> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader
        .headers()
        .map_err(|e| PipelineError::Parse(format!("unreadable header in {}: {e}", path.display())))?;

    let missing: Vec<&str> = TRIP_COLUMNS
        .iter()
        .copied()
        .filter(|expected| !headers.iter().any(|h| h == *expected))
        .collect();

    if !missing.is_empty() {
        return Err(PipelineError::Parse(format!(
            "{} is missing required columns: {}",
            path.display(),
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Loads the trip file at `path` into a typed table.
pub fn read_trips(path: &Path) -> Result<DataFrame> {
    check_columns(path)?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_schema_overwrite(Some(Arc::new(trip_schema())))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    debug!(rows = df.height(), path = %path.display(), "Trip file read");
    Ok(df)
}

/// Parses timestamps and adds the derived columns.
pub fn derive_columns(df: DataFrame) -> Result<DataFrame> {
    let parse_ts = |name: &str| {
        col(name)
            .str()
            .to_datetime(
                Some(TimeUnit::Microseconds),
                None,
                StrptimeOptions::default(),
                lit("raise"),
            )
            .alias(name)
    };

    let df = df
        .lazy()
        .with_columns([parse_ts("started_at"), parse_ts("ended_at")])
        .with_columns([
            (col("ended_at") - col("started_at")).alias("duration"),
            (col("ended_at") - col("started_at"))
                .dt()
                .total_seconds()
                .alias("duration_seconds"),
            col("ended_at")
                .dt()
                .week()
                .cast(DataType::Int32)
                .alias("week"),
        ])
        .collect()?;

    Ok(df)
}

/// Keeps the first row for each `ride_id`, preserving input order.
pub fn dedup_rides(df: DataFrame) -> Result<DataFrame> {
    let df = df
        .lazy()
        .filter(col("ride_id").is_first_distinct())
        .collect()?;
    Ok(df)
}

/// Full Transformer stage: read, derive, dedup.
pub fn transform(path: &Path) -> Result<DataFrame> {
    let raw = read_trips(path)?;
    let raw_rows = raw.height();
    let df = dedup_rides(derive_columns(raw)?)?;

    info!(
        rows = df.height(),
        duplicates = raw_rows - df.height(),
        "Trips transformed"
    );
    Ok(df)
}
