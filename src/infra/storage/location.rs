use std::fmt;

use crate::error::{PipelineError, Result};

/// A `{endpoint}/{bucket}/{key}` string split into its parts.
///
/// Stages hand these strings to each other; the receiving stage re-parses
/// them against the bucket it expects to read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    pub endpoint: String,
    pub bucket: String,
    pub key: String,
}

impl StorageLocation {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Splits `location` on `/{bucket}/`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Format`] unless the delimiter occurs exactly
    /// once.
    pub fn parse(location: &str, bucket: &str) -> Result<Self> {
        let delimiter = format!("/{bucket}/");
        let parts: Vec<&str> = location.split(delimiter.as_str()).collect();
        if parts.len() != 2 {
            return Err(PipelineError::Format(format!(
                "invalid storage location for bucket '{bucket}': {location}"
            )));
        }

        Ok(Self::new(parts[0], bucket, parts[1]))
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.endpoint, self.bucket, self.key)
    }
}
