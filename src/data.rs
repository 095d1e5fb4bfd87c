use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::{fs, path::Path};

/// Reads a JSON array of records.
pub fn load_records<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let txt = fs::read_to_string(path).with_context(|| format!("failed to read records at {}", path.display()))?;
    let records: Vec<T> =
        serde_json::from_str(&txt).with_context(|| format!("failed to parse records in {}", path.display()))?;
    tracing::info!("loaded {} records from {}", records.len(), path.display());
    Ok(records)
}
