//! Named S3 connection profiles.
//!
//! Stored as a plain JSON object on disk, keyed by connection id:
//! ```json
//! {
//!   "minio_s3_conn": {
//!     "endpoint_url": "http://minio:9000",
//!     "region": "us-east-1",
//!     "access_key_id": "minioadmin",
//!     "secret_access_key": "minioadmin",
//!     "force_path_style": true
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Endpoint and credentials for one S3-compatible service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct S3Profile {
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

impl S3Profile {
    /// Builds a profile from `S3_ENDPOINT_URL`, `AWS_REGION`,
    /// `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` as returned by `lookup`.
    ///
    /// A custom endpoint implies path-style addressing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let endpoint_url = lookup("S3_ENDPOINT_URL").filter(|s| !s.is_empty());
        Self {
            force_path_style: endpoint_url.is_some(),
            endpoint_url,
            region: lookup("AWS_REGION").unwrap_or_else(default_region),
            access_key_id: lookup("AWS_ACCESS_KEY_ID"),
            secret_access_key: lookup("AWS_SECRET_ACCESS_KEY"),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

/// Maps connection ids to [`S3Profile`]s.
pub struct ConnectionProfiles {
    entries: HashMap<String, S3Profile>,
}

impl ConnectionProfiles {
    /// Loads the profiles from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read connection profiles from '{path}'"))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let entries: HashMap<String, S3Profile> =
            serde_json::from_str(content).context("malformed connection profiles")?;
        Ok(Self { entries })
    }

    /// Returns the profile for `id`, if one is configured.
    pub fn get(&self, id: &str) -> Option<&S3Profile> {
        self.entries.get(id)
    }

    /// Iterates over all `(id, profile)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &S3Profile)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Resolves connection `id` from the profile file at `path`, falling back to
/// the environment when the file is absent or has no entry for `id`.
pub fn resolve_profile(path: &str, id: &str) -> Result<S3Profile> {
    if Path::new(path).exists() {
        let profiles = ConnectionProfiles::load(path)?;
        if let Some(profile) = profiles.get(id) {
            info!(connection = id, path, "Using connection profile from file");
            return Ok(profile.clone());
        }
        debug!(
            connection = id,
            known = profiles.iter().count(),
            "Connection id not in profile file"
        );
    }

    info!(connection = id, "Using connection profile from environment");
    Ok(S3Profile::from_env())
}
