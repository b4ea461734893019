//! Anomaly reporting over the transformed trip table.
//!
//! Two classes are counted and written to the flag sink as one summary line
//! each. The table itself is returned untouched.

use std::io::Write;

use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::stages::sink::FlagSink;

/// Rides longer than this many seconds (45 minutes) are flagged.
pub const LONG_RIDE_SECONDS: i64 = 2700;

/// Start times at or past this hour and minute are flagged.
///
/// Both components must match, so only 23:59 qualifies.
pub const LATE_START_HOUR: i32 = 23;
pub const LATE_START_MINUTE: i32 = 59;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlagCounts {
    pub long_rides: usize,
    pub late_starts: usize,
}

pub fn long_ride_predicate() -> Expr {
    col("duration_seconds").gt(lit(LONG_RIDE_SECONDS))
}

pub fn late_start_predicate() -> Expr {
    col("started_at")
        .dt()
        .hour()
        .cast(DataType::Int32)
        .gt_eq(lit(LATE_START_HOUR))
        .and(
            col("started_at")
                .dt()
                .minute()
                .cast(DataType::Int32)
                .gt_eq(lit(LATE_START_MINUTE)),
        )
}

fn count_matching(df: &DataFrame, predicate: Expr) -> Result<usize> {
    Ok(df.clone().lazy().filter(predicate).collect()?.height())
}

/// Counts rows in each anomaly class.
pub fn count_flags(df: &DataFrame) -> Result<FlagCounts> {
    Ok(FlagCounts {
        long_rides: count_matching(df, long_ride_predicate())?,
        late_starts: count_matching(df, late_start_predicate())?,
    })
}

/// Flagger stage: writes one line per anomaly class and passes `df` through.
pub fn flag_rides<W: Write>(
    df: DataFrame,
    sink: &mut FlagSink<W>,
) -> Result<(DataFrame, FlagCounts)> {
    let counts = count_flags(&df)?;

    sink.warn(&format!("Long rides > 45 mins: {}", counts.long_rides))?;
    sink.warn(&format!(
        "Rides starting after 11:59 PM: {}",
        counts.late_starts
    ))?;

    info!(
        long_rides = counts.long_rides,
        late_starts = counts.late_starts,
        "Rides flagged"
    );
    Ok((df, counts))
}
