//! CLI entry point for the bikeshare ETL pipeline.
//!
//! Provides subcommands for a single run, the weekly scheduled loop, an
//! offline transform of a local trip file, and inspecting the schedule.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bikeshare_etl::config::PipelineConfig;
use bikeshare_etl::fetch::BasicClient;
use bikeshare_etl::infra::profiles::resolve_profile;
use bikeshare_etl::infra::storage::S3Store;
use bikeshare_etl::pipeline::PipelineContext;
use bikeshare_etl::schedule::{RetryPolicy, next_run_after, run_and_record, run_scheduled};
use bikeshare_etl::stages::writer::output_key;
use bikeshare_etl::stages::{FlagSink, encode_partitioned, flag_rides, transform};
use bikeshare_etl::telemetry;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "bikeshare_etl")]
#[command(about = "Weekly ETL for bikeshare trip history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline once, now
    Run {
        /// Do not retry failed stages
        #[arg(long, default_value_t = false)]
        no_retry: bool,
    },
    /// Run the pipeline every Monday at 10:00 UTC
    Schedule,
    /// Transform, flag and write a local trip CSV without touching storage
    Transform {
        /// Trip CSV to read
        #[arg(short, long)]
        input: PathBuf,

        /// Parquet file to write (defaults to the date-stamped output name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the next scheduled run time
    NextRun,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _log_guard = telemetry::init();
    let cli = Cli::parse();
    let config = PipelineConfig::from_env();

    match cli.command {
        Commands::Run { no_retry } => {
            let ctx = build_context(config).await?;
            let policy = if no_retry {
                RetryPolicy::none()
            } else {
                RetryPolicy::default()
            };

            let report = run_and_record(&ctx, policy).await?;
            info!(
                run_date = %report.run_date,
                rows = report.rows,
                long_rides = report.flags.long_rides,
                late_starts = report.flags.late_starts,
                output_key = %report.output_key,
                partitions = report.partitions,
                "Run finished"
            );
        }
        Commands::Schedule => {
            let ctx = build_context(config).await?;
            run_scheduled(ctx, RetryPolicy::default()).await;
        }
        Commands::Transform { input, output } => {
            let output =
                output.unwrap_or_else(|| PathBuf::from(output_key(Utc::now().date_naive())));

            let df = transform(&input)?;
            let mut sink = FlagSink::open(&config.flag_log_path)?;
            let (df, flags) = flag_rides(df, &mut sink)?;
            sink.close()?;

            let (bytes, partitions) = encode_partitioned(&df)?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("failed to write {}", output.display()))?;

            info!(
                rows = df.height(),
                long_rides = flags.long_rides,
                late_starts = flags.late_starts,
                partitions = partitions.len(),
                output = %output.display(),
                "Local transform finished"
            );
        }
        Commands::NextRun => {
            let next = next_run_after(Utc::now());
            info!(next_run = %next, "Next scheduled run");
        }
    }

    Ok(())
}

/// Connects to the configured object store and HTTP source.
async fn build_context(config: PipelineConfig) -> Result<PipelineContext> {
    let profile = resolve_profile(&config.connections_file, &config.connection_id)?;
    let store = S3Store::connect(&profile)
        .await
        .context("failed to configure object store")?;
    let http = BasicClient::with_timeout(config.fetch_timeout)?;

    info!(
        endpoint = %profile.endpoint_url.as_deref().unwrap_or("aws"),
        raw_bucket = %config.raw_bucket,
        cleaned_bucket = %config.cleaned_bucket,
        "Pipeline configured"
    );

    Ok(PipelineContext {
        config,
        store: Arc::new(store),
        http: Arc::new(http),
        run_date: Utc::now().date_naive(),
    })
}
