//! The seven pipeline stages, one module each.
//!
//! Stages talk to each other through plain values: storage location strings,
//! a local file path, and a polars [`DataFrame`](polars::prelude::DataFrame)
//! moved from one stage to the next.

use crate::error::Result;

pub mod fetcher;
pub mod flagger;
pub mod loader;
pub mod selector;
pub mod sink;
pub mod transformer;
pub mod unpacker;
pub mod writer;

pub use fetcher::fetch_archive;
pub use flagger::{FlagCounts, flag_rides};
pub use loader::load_to_database;
pub use selector::select_dataset;
pub use sink::FlagSink;
pub use transformer::transform;
pub use unpacker::unpack_archive;
pub use writer::{encode_partitioned, write_partitioned};

/// Runs CPU-bound table work off the async workers.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}
