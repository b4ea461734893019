use bytes::Bytes;
use chrono::NaiveDate;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::fetch::{HttpClient, fetch_bytes};
use crate::infra::storage::{ObjectStore, StorageLocation};

/// Raw-bucket key for the archive downloaded on `run_date`.
pub fn archive_key(run_date: NaiveDate) -> String {
    format!("{}_capitalbikeshare-tripdata.zip", run_date.format("%Y-%m-%d"))
}

/// Downloads the trip-history archive and stores it in the raw bucket.
///
/// Returns the `{endpoint}/{bucket}/{key}` location of the stored archive.
pub async fn fetch_archive(
    http: &dyn HttpClient,
    store: &dyn ObjectStore,
    config: &PipelineConfig,
    run_date: NaiveDate,
) -> Result<String> {
    let bytes = fetch_bytes(http, &config.data_url, config.chunk_size).await?;
    let key = archive_key(run_date);
    let size = bytes.len();

    store
        .put(&config.raw_bucket, &key, Bytes::from(bytes), true)
        .await?;

    let location = StorageLocation::new(store.endpoint(), &config.raw_bucket, key);
    info!(bytes = size, location = %location, "Archive stored");
    Ok(location.to_string())
}
