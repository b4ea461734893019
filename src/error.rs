//! Error taxonomy for a pipeline run.
//!
//! A stage that fails is retried according to the run's retry policy. An
//! error that outlives those retries ends the run.

use thiserror::Error;

use crate::infra::storage::StorageError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The HTTP fetch failed or returned a non-success status.
    #[error("transport error: {0}")]
    Transport(String),

    /// A storage location or archive did not have the expected shape.
    #[error("format error: {0}")]
    Format(String),

    /// No dataset file was found where one was expected.
    #[error("not found: {0}")]
    NotFound(String),

    /// Tabular input was missing columns or held unparseable values.
    #[error("parse error: {0}")]
    Parse(String),

    /// The output table could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Short tag used in logs and the run ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Transport(_) => "transport",
            PipelineError::Format(_) => "format",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Parse(_) => "parse",
            PipelineError::Encode(_) => "encode",
            PipelineError::Storage(_) => "storage",
            PipelineError::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Transport(err.to_string())
    }
}

impl From<zip::result::ZipError> for PipelineError {
    fn from(err: zip::result::ZipError) -> Self {
        PipelineError::Format(format!("unreadable archive: {err}"))
    }
}

impl From<polars::prelude::PolarsError> for PipelineError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        PipelineError::Parse(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Io(std::io::Error::other(err))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(PipelineError::Transport("x".into()).kind(), "transport");
        assert_eq!(PipelineError::Format("x".into()).kind(), "format");
        assert_eq!(PipelineError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(PipelineError::Parse("x".into()).kind(), "parse");
        assert_eq!(
            PipelineError::Storage(StorageError::NotFound("k".into())).kind(),
            "storage"
        );
    }

    #[test]
    fn test_display_includes_category() {
        let err = PipelineError::NotFound("No CSV found in raw/2022/".into());
        assert_eq!(err.to_string(), "not found: No CSV found in raw/2022/");
    }
}
