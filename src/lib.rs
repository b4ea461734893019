pub mod config;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod output;
pub mod pipeline;
pub mod schedule;
pub mod stages;
pub mod telemetry;

pub use error::{PipelineError, Result};
pub use pipeline::{PipelineContext, RunReport, Stage, run_once};
