use serde::Serialize;
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub key: String,
    /// Always `false` until a database target exists.
    pub persisted: bool,
}

/// Database load of the uploaded output. Not yet implemented: it reports
/// success and persists nothing.
pub async fn load_to_database(key: &str) -> Result<LoadOutcome> {
    warn!(key, "Database load not yet implemented, skipping");
    Ok(LoadOutcome {
        key: key.to_string(),
        persisted: false,
    })
}
