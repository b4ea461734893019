use std::env;
use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use bikeshare_etl::config::PipelineConfig;
use bikeshare_etl::fetch::HttpClient;
use bikeshare_etl::infra::storage::{MemoryStore, ObjectStore, StorageError};
use bikeshare_etl::pipeline::{PipelineContext, run_once};
use bikeshare_etl::schedule::{RetryPolicy, run_and_record};
use bikeshare_etl::PipelineError;
use chrono::NaiveDate;
use zip::ZipWriter;
use zip::write::FileOptions;

const HEADER: &str = "ride_id,rideable_type,started_at,ended_at,start_station_name,start_station_id,end_station_name,end_station_id,start_lat,start_lng,end_lat,end_lng,member_casual";

struct CannedClient {
    status: u16,
    body: Vec<u8>,
}

#[async_trait]
impl HttpClient for CannedClient {
    async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let resp = http::Response::builder()
            .status(self.status)
            .body(self.body.clone())
            .unwrap();
        Ok(resp.into())
    }
}

/// Answers with `503` on the first request and the archive afterwards.
struct FlakyClient {
    body: Vec<u8>,
    calls: AtomicUsize,
}

#[async_trait]
impl HttpClient for FlakyClient {
    async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let status = if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            503
        } else {
            200
        };
        let resp = http::Response::builder()
            .status(status)
            .body(self.body.clone())
            .unwrap();
        Ok(resp.into())
    }
}

/// Rejects the first upload to `failing_bucket` and counts every upload.
struct FlakyStore {
    inner: MemoryStore,
    failing_bucket: String,
    failed: AtomicUsize,
    puts: AtomicUsize,
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if bucket == self.failing_bucket && self.failed.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(StorageError::Sdk("connection reset".to_string()));
        }
        self.inner.put(bucket, key, bytes, overwrite).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        self.inner.get(bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(bucket, prefix).await
    }

    fn endpoint(&self) -> String {
        self.inner.endpoint()
    }
}

fn archive(files: &[(&str, String)]) -> Vec<u8> {
    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = FileOptions::default();
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buffer
}

fn trips_csv() -> String {
    [
        HEADER,
        "A1,classic_bike,2022-12-01 08:00:00,2022-12-01 09:00:00,Union Station,31623,Dupont Circle,31200,38.89,-77.0,38.91,-77.04,member",
        "A1,classic_bike,2022-12-01 12:00:00,2022-12-01 12:05:00,Union Station,31623,Dupont Circle,31200,38.89,-77.0,38.91,-77.04,member",
        "B2,electric_bike,2022-12-01 23:59:00,2022-12-01 23:20:00,,,,,38.90,-77.01,38.90,-77.02,casual",
        "C3,docked_bike,2022-12-12 10:00:00,2022-12-12 10:20:00,,,,,38.90,-77.01,38.90,-77.02,casual",
    ]
    .join("\n")
}

fn scratch(name: &str) -> PathBuf {
    let dir = env::temp_dir().join(format!("bikeshare_etl_it_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn config(dir: &PathBuf) -> PipelineConfig {
    PipelineConfig {
        data_url: "http://example.com/202212-capitalbikeshare-tripdata.zip".to_string(),
        raw_bucket: "raw".to_string(),
        cleaned_bucket: "cleaned".to_string(),
        work_dir: dir.join("work"),
        flag_log_path: dir.join("ride_flags.log"),
        run_ledger_path: dir.join("runs.csv"),
        ..PipelineConfig::default()
    }
}

fn context(dir: &PathBuf, store: Arc<MemoryStore>, body: Vec<u8>, status: u16) -> PipelineContext {
    PipelineContext {
        config: config(dir),
        store,
        http: Arc::new(CannedClient { status, body }),
        run_date: NaiveDate::from_ymd_opt(2022, 12, 5).unwrap(),
    }
}

fn no_retry() -> RetryPolicy {
    RetryPolicy {
        retries: 0,
        delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_full_pipeline() {
    let dir = scratch("full");
    let store = Arc::new(MemoryStore::with_endpoint("http://minio:9000"));
    let body = archive(&[
        ("Readme.txt", "about".to_string()),
        ("202212-capitalbikeshare-tripdata.csv", trips_csv()),
    ]);
    let ctx = context(&dir, store.clone(), body, 200);

    let report = run_and_record(&ctx, no_retry()).await.expect("pipeline run failed");

    assert_eq!(
        report.archive,
        "http://minio:9000/raw/2022-12-05_capitalbikeshare-tripdata.zip"
    );
    assert_eq!(report.members, 2);
    assert_eq!(report.rows, 3);
    assert_eq!(report.flags.long_rides, 1);
    assert_eq!(report.flags.late_starts, 1);
    assert_eq!(report.output_key, "capitalbikeshare-tripdata_2022-12-05.parquet");
    assert_eq!(report.partitions, 3);
    assert!(!report.persisted);

    assert_eq!(
        store.keys("raw"),
        vec![
            "2022-12-05_capitalbikeshare-tripdata.zip",
            "2022-12-05_capitalbikeshare-tripdata/202212-capitalbikeshare-tripdata.csv",
            "2022-12-05_capitalbikeshare-tripdata/Readme.txt",
        ]
    );
    let output = store.get("cleaned", &report.output_key).await.unwrap();
    assert_eq!(output.len(), report.output_bytes);
    assert_eq!(&output[..4], b"PAR1");

    let flags = fs::read_to_string(dir.join("ride_flags.log")).unwrap();
    assert_eq!(flags.lines().count(), 2);

    let ledger = fs::read_to_string(dir.join("runs.csv")).unwrap();
    let rows: Vec<_> = ledger.lines().collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[1].contains(",success,1,3,1,1,"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_archive_without_csv_fails_and_keeps_artifacts() {
    let dir = scratch("no_csv");
    let store = Arc::new(MemoryStore::with_endpoint("http://minio:9000"));
    let body = archive(&[("Readme.txt", "about".to_string())]);
    let ctx = context(&dir, store.clone(), body, 200);

    let err = run_and_record(&ctx, no_retry()).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));

    // earlier uploads are not rolled back
    assert_eq!(store.keys("raw").len(), 2);
    assert!(store.keys("cleaned").is_empty());

    let ledger = fs::read_to_string(dir.join("runs.csv")).unwrap();
    assert!(ledger.contains("not_found"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_http_failure_is_transport_error() {
    let dir = scratch("http_fail");
    let store = Arc::new(MemoryStore::new());
    let ctx = context(&dir, store.clone(), b"gateway down".to_vec(), 503);

    let err = run_once(&ctx).await.unwrap_err();
    assert!(matches!(err, PipelineError::Transport(_)));
    assert!(store.keys("raw").is_empty());

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_malformed_dataset_is_parse_error() {
    let dir = scratch("bad_csv");
    let store = Arc::new(MemoryStore::new());
    let csv = format!(
        "{HEADER}\nA1,classic_bike,2022-12-01 08:00:00,2022-12-01 09:00:00,Union Station,not-a-number,,,1.0,1.0,1.0,1.0,member"
    );
    let ctx = context(&dir, store, archive(&[("trips.csv", csv)]), 200);

    let err = run_once(&ctx).await.unwrap_err();
    assert!(matches!(err, PipelineError::Parse(_)));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_each_stage_retries_on_its_own() {
    let dir = scratch("stage_retry");
    let body = archive(&[("202212-capitalbikeshare-tripdata.csv", trips_csv())]);
    let http = Arc::new(FlakyClient {
        body,
        calls: AtomicUsize::new(0),
    });
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::with_endpoint("http://minio:9000"),
        failing_bucket: "cleaned".to_string(),
        failed: AtomicUsize::new(0),
        puts: AtomicUsize::new(0),
    });
    let ctx = PipelineContext {
        config: config(&dir),
        store: store.clone(),
        http: http.clone(),
        run_date: NaiveDate::from_ymd_opt(2022, 12, 5).unwrap(),
    };
    let policy = RetryPolicy {
        retries: 1,
        delay: Duration::ZERO,
    };

    // the fetch and the write each fail once
    let report = run_and_record(&ctx, policy).await.expect("pipeline run failed");
    assert_eq!(report.rows, 3);
    assert_eq!(http.calls.load(Ordering::SeqCst), 2);

    // archive + one member, then two tries at the output
    assert_eq!(store.puts.load(Ordering::SeqCst), 4);
    assert_eq!(store.inner.keys("cleaned"), vec![report.output_key.clone()]);

    // the flagger ran once
    let flags = fs::read_to_string(dir.join("ride_flags.log")).unwrap();
    assert_eq!(flags.lines().count(), 2);

    let ledger = fs::read_to_string(dir.join("runs.csv")).unwrap();
    assert!(ledger.lines().nth(1).unwrap().contains(",success,3,3,1,1,"));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_stage_failing_twice_ends_run() {
    let dir = scratch("stage_exhausted");
    let body = archive(&[("202212-capitalbikeshare-tripdata.csv", trips_csv())]);
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::with_endpoint("http://minio:9000"),
        failing_bucket: "cleaned".to_string(),
        failed: AtomicUsize::new(0),
        puts: AtomicUsize::new(0),
    });
    let ctx = PipelineContext {
        config: config(&dir),
        store: store.clone(),
        http: Arc::new(CannedClient { status: 200, body }),
        run_date: NaiveDate::from_ymd_opt(2022, 12, 5).unwrap(),
    };

    let err = run_and_record(&ctx, no_retry()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));
    assert!(store.inner.keys("cleaned").is_empty());

    let ledger = fs::read_to_string(dir.join("runs.csv")).unwrap();
    assert!(ledger.lines().nth(1).unwrap().contains(",failed,1,"));

    fs::remove_dir_all(&dir).unwrap();
}
