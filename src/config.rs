//! Run configuration, resolved from environment variables with defaults.

use std::path::PathBuf;
use std::time::Duration;

pub const DATA_URL: &str =
    "https://s3.amazonaws.com/capitalbikeshare-data/202212-capitalbikeshare-tripdata.zip";
pub const RAW_BUCKET: &str = "bikeshare-raw-data";
pub const CLEANED_BUCKET: &str = "bikeshare-cleaned-data";
pub const CONNECTION_ID: &str = "minio_s3_conn";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_url: String,
    pub raw_bucket: String,
    pub cleaned_bucket: String,
    /// Name of the S3 connection profile to resolve.
    pub connection_id: String,
    pub connections_file: String,
    /// Local scratch directory the selected dataset is downloaded into.
    pub work_dir: PathBuf,
    pub flag_log_path: PathBuf,
    pub run_ledger_path: PathBuf,
    pub fetch_timeout: Duration,
    /// Initial download buffer size when the server sends no content length.
    /// Chunk boundaries themselves are whatever the connection delivers.
    pub chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_url: DATA_URL.to_string(),
            raw_bucket: RAW_BUCKET.to_string(),
            cleaned_bucket: CLEANED_BUCKET.to_string(),
            connection_id: CONNECTION_ID.to_string(),
            connections_file: "connections.json".to_string(),
            work_dir: PathBuf::from("data"),
            flag_log_path: PathBuf::from("ride_flags.log"),
            run_ledger_path: PathBuf::from("runs.csv"),
            fetch_timeout: Duration::from_secs(30),
            chunk_size: 8192,
        }
    }
}

impl PipelineConfig {
    /// Overlays whatever `lookup` returns on top of [`PipelineConfig::default`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        Self {
            data_url: get("DATA_URL").unwrap_or(defaults.data_url),
            raw_bucket: get("RAW_BUCKET").unwrap_or(defaults.raw_bucket),
            cleaned_bucket: get("CLEANED_BUCKET").unwrap_or(defaults.cleaned_bucket),
            connection_id: get("S3_CONNECTION_ID").unwrap_or(defaults.connection_id),
            connections_file: get("S3_CONNECTIONS_FILE").unwrap_or(defaults.connections_file),
            work_dir: get("WORK_DIR").map(PathBuf::from).unwrap_or(defaults.work_dir),
            flag_log_path: get("FLAG_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.flag_log_path),
            run_ledger_path: get("RUN_LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.run_ledger_path),
            ..defaults
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}
