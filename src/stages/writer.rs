//! Parquet output, partitioned by `member_casual` and `week`.
//!
//! The table is sorted by the partition keys and written as one Parquet file
//! in which each partition occupies its own row groups, so readers can prune
//! on the row-group statistics of either key. The file is uploaded as a
//! single date-stamped object.

use bytes::Bytes;
use chrono::NaiveDate;
use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::infra::storage::ObjectStore;
use crate::stages::run_blocking;

pub const PARTITION_COLUMNS: [&str; 2] = ["member_casual", "week"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub member_casual: Option<String>,
    pub week: Option<i32>,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct WrittenOutput {
    pub key: String,
    pub bytes: usize,
    pub partitions: Vec<Partition>,
}

/// Cleaned-bucket key for the output written on `run_date`.
pub fn output_key(run_date: NaiveDate) -> String {
    format!(
        "capitalbikeshare-tripdata_{}.parquet",
        run_date.format("%Y-%m-%d")
    )
}

fn encode_error(err: PolarsError) -> PipelineError {
    PipelineError::Encode(err.to_string())
}

fn describe(part: &DataFrame) -> Result<Partition> {
    let member_casual = part
        .column("member_casual")?
        .str()?
        .get(0)
        .map(str::to_string);
    let week = part.column("week")?.i32()?.get(0);
    Ok(Partition {
        member_casual,
        week,
        rows: part.height(),
    })
}

/// Serializes `df` to Parquet bytes with partition-aligned row groups.
pub fn encode_partitioned(df: &DataFrame) -> Result<(Vec<u8>, Vec<Partition>)> {
    let sorted = df.sort(
        PARTITION_COLUMNS,
        SortMultipleOptions::default()
            .with_maintain_order(true)
            .with_nulls_last(true),
    )?;
    let parts = sorted.partition_by_stable(PARTITION_COLUMNS, true)?;

    let mut buffer = Vec::new();
    let mut partitions = Vec::with_capacity(parts.len());
    {
        let mut writer = ParquetWriter::new(&mut buffer)
            .with_compression(ParquetCompression::Zstd(None))
            .with_statistics(StatisticsOptions::default())
            .batched(sorted.schema())
            .map_err(encode_error)?;

        for part in &parts {
            writer.write_batch(part).map_err(encode_error)?;
            let partition = describe(part)?;
            debug!(
                member_casual = partition.member_casual.as_deref().unwrap_or("null"),
                week = partition.week,
                rows = partition.rows,
                "Partition written"
            );
            partitions.push(partition);
        }

        writer.finish().map_err(encode_error)?;
    }

    Ok((buffer, partitions))
}

/// Writer stage: encodes `df` and uploads it to `bucket`.
pub async fn write_partitioned(
    df: &DataFrame,
    store: &dyn ObjectStore,
    bucket: &str,
    run_date: NaiveDate,
) -> Result<WrittenOutput> {
    let owned = df.clone();
    let (buffer, partitions) = run_blocking(move || encode_partitioned(&owned)).await?;
    let key = output_key(run_date);
    let bytes = buffer.len();

    store.put(bucket, &key, Bytes::from(buffer), true).await?;

    info!(
        bucket,
        key,
        bytes,
        partitions = partitions.len(),
        "Output uploaded"
    );
    Ok(WrittenOutput {
        key,
        bytes,
        partitions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::storage::MemoryStore;
    use crate::stages::transformer::tests::write_csv;
    use crate::stages::transformer::transform;
    use std::fs;
    use std::io::Cursor;

    fn sample(name: &str) -> DataFrame {
        let path = write_csv(
            name,
            &[
                "A,classic_bike,2022-12-01 08:00:00,2022-12-01 08:10:00,,,,,1.0,1.0,1.0,1.0,member",
                "B,classic_bike,2022-12-12 08:00:00,2022-12-12 08:10:00,,,,,1.0,1.0,1.0,1.0,casual",
                "C,classic_bike,2022-12-02 08:00:00,2022-12-02 08:10:00,,,,,1.0,1.0,1.0,1.0,member",
                "D,classic_bike,2022-12-01 09:00:00,2022-12-01 09:10:00,,,,,1.0,1.0,1.0,1.0,casual",
            ],
        );
        let df = transform(&path).unwrap();
        fs::remove_file(&path).unwrap();
        df
    }

    #[test]
    fn test_output_key() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 5).unwrap();
        assert_eq!(output_key(date), "capitalbikeshare-tripdata_2025-05-05.parquet");
    }

    #[test]
    fn test_encode_groups_rows_by_partition() {
        let df = sample("writer_encode");
        let (bytes, partitions) = encode_partitioned(&df).unwrap();

        let keys: Vec<_> = partitions
            .iter()
            .map(|p| (p.member_casual.as_deref().unwrap(), p.week.unwrap(), p.rows))
            .collect();
        assert_eq!(keys, vec![("casual", 48, 1), ("casual", 50, 1), ("member", 48, 2)]);

        let read = ParquetReader::new(Cursor::new(bytes)).finish().unwrap();
        assert_eq!(read.height(), df.height());
        assert_eq!(read.get_column_names(), df.get_column_names());
        let members = read.column("member_casual").unwrap().str().unwrap();
        assert_eq!(members.get(0), Some("casual"));
        assert_eq!(members.get(3), Some("member"));
    }

    #[tokio::test]
    async fn test_write_uploads_single_object() {
        let df = sample("writer_upload");
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2022, 12, 5).unwrap();

        let out = write_partitioned(&df, &store, "cleaned", date).await.unwrap();

        assert_eq!(out.key, "capitalbikeshare-tripdata_2022-12-05.parquet");
        assert_eq!(store.keys("cleaned"), vec![out.key.clone()]);
        assert_eq!(store.get("cleaned", &out.key).await.unwrap().len(), out.bytes);
        assert_eq!(out.partitions.len(), 3);
    }
}
