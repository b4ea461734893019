//! One pipeline run: the seven stages in order, each feeding the next.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{Instrument, error, info, info_span};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::fetch::HttpClient;
use crate::infra::storage::ObjectStore;
use crate::schedule::{RetryPolicy, run_with_retry};
use crate::stages::{self, FlagCounts, FlagSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Unpack,
    Select,
    Transform,
    Flag,
    Write,
    Load,
}

impl Stage {
    /// Execution order.
    pub const ALL: [Stage; 7] = [
        Stage::Fetch,
        Stage::Unpack,
        Stage::Select,
        Stage::Transform,
        Stage::Flag,
        Stage::Write,
        Stage::Load,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Unpack => "unpack",
            Stage::Select => "select",
            Stage::Transform => "transform",
            Stage::Flag => "flag",
            Stage::Write => "write",
            Stage::Load => "load",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a run needs. Cloning is cheap; the store and client are shared.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub store: Arc<dyn ObjectStore>,
    pub http: Arc<dyn HttpClient>,
    /// Date stamped into the archive and output keys.
    pub run_date: NaiveDate,
}

impl PipelineContext {
    pub fn for_date(&self, run_date: NaiveDate) -> Self {
        Self {
            run_date,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_date: NaiveDate,
    pub archive: String,
    pub members: usize,
    pub dataset: PathBuf,
    pub rows: usize,
    pub flags: FlagCounts,
    pub output_key: String,
    pub output_bytes: usize,
    pub partitions: usize,
    pub persisted: bool,
}

/// Runs stages with a shared retry policy and counts the retries spent.
struct StageRunner {
    policy: RetryPolicy,
    retries: u32,
}

impl StageRunner {
    fn new(policy: RetryPolicy) -> Self {
        Self { policy, retries: 0 }
    }

    /// Runs `work` inside a span named after `stage`. A failed attempt is
    /// retried on its own; stages that already finished are not repeated.
    async fn run<T, F, Fut>(&mut self, stage: Stage, mut work: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let span = info_span!("stage", name = stage.name());
        async {
            info!("Stage started");
            let (result, attempts) = run_with_retry(self.policy, |_| work()).await;
            self.retries += attempts.saturating_sub(1);
            match result {
                Ok(value) => {
                    info!(attempts, "Stage finished");
                    Ok(value)
                }
                Err(err) => {
                    error!(attempts, kind = err.kind(), error = %err, "Stage failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Executes every stage once, strictly in order, without retries.
///
/// The first failure ends the run. Objects already uploaded by earlier
/// stages are left in place.
pub async fn run_once(ctx: &PipelineContext) -> Result<RunReport> {
    run_with_policy(ctx, RetryPolicy::none()).await.0
}

/// Executes every stage in order, retrying each failed stage per `policy`.
///
/// Returns the outcome and the number of attempts: one plus every retry
/// spent across the stages.
pub async fn run_with_policy(ctx: &PipelineContext, policy: RetryPolicy) -> (Result<RunReport>, u32) {
    let mut runner = StageRunner::new(policy);
    let run_span = info_span!("run", run_date = %ctx.run_date);
    let result = run_stages(ctx, &mut runner).instrument(run_span).await;
    (result, runner.retries + 1)
}

async fn run_stages(ctx: &PipelineContext, runner: &mut StageRunner) -> Result<RunReport> {
    let config = &ctx.config;
    let store = ctx.store.as_ref();
    let http = ctx.http.as_ref();

    let archive = runner
        .run(Stage::Fetch, || {
            stages::fetch_archive(http, store, config, ctx.run_date)
        })
        .await?;

    let unpacked = runner
        .run(Stage::Unpack, || {
            stages::unpack_archive(store, &config.raw_bucket, &archive)
        })
        .await?;

    let dataset = runner
        .run(Stage::Select, || {
            stages::select_dataset(store, &config.raw_bucket, &unpacked.folder, &config.work_dir)
        })
        .await?;

    let df = runner
        .run(Stage::Transform, || {
            let path = dataset.clone();
            stages::run_blocking(move || stages::transform(&path))
        })
        .await?;

    let (df, flags) = runner
        .run(Stage::Flag, || {
            let df = df.clone();
            async move {
                let mut sink = FlagSink::open(&config.flag_log_path)?;
                let flagged = stages::flag_rides(df, &mut sink)?;
                sink.close()?;
                Ok::<_, PipelineError>(flagged)
            }
        })
        .await?;

    let written = runner
        .run(Stage::Write, || {
            stages::write_partitioned(&df, store, &config.cleaned_bucket, ctx.run_date)
        })
        .await?;

    let loaded = runner
        .run(Stage::Load, || stages::load_to_database(&written.key))
        .await?;

    let report = RunReport {
        run_date: ctx.run_date,
        archive,
        members: unpacked.keys.len(),
        dataset,
        rows: df.height(),
        flags,
        output_key: written.key,
        output_bytes: written.bytes,
        partitions: written.partitions.len(),
        persisted: loaded.persisted,
    };
    info!(
        rows = report.rows,
        output_key = %report.output_key,
        retries = runner.retries,
        "Run complete"
    );
    Ok(report)
}
