//! Shared filesystem helpers: JSON read + write-to-temp-then-rename.
//!
//! §5 mandates that task/registry/context JSON files are written via
//! write-to-temp + atomic rename. This is the one place that discipline
//! lives so every store gets it for free.

use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

use crate::error::{OrchestratorError, Result};

/// Read and deserialize a JSON file, returning `Ok(None)` if it does not
/// exist yet (never creating it as a side effect).
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| OrchestratorError::FormatError(format!("{}: {e}", path.display())))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(OrchestratorError::IOFailure(format!("{}: {e}", path.display()))),
    }
}

/// Serialize `value` and write it atomically: write to `<path>.tmp-<pid>`
/// in the same directory, then rename over the destination. Creates
/// parent directories as needed.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let payload = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension(format!(
        "tmp-{}",
        std::process::id()
    ));
    tokio::fs::write(&tmp_path, &payload).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Remove a directory and everything under it; a directory that's
/// already gone counts as success rather than an error.
pub async fn remove_dir_all_lenient(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OrchestratorError::IOFailure(format!("{}: {e}", path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: u32,
    }

    #[tokio::test]
    async fn round_trips_through_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        write_json_atomic(&path, &Sample { value: 7 }).await.unwrap();
        let loaded: Sample = read_json(&path).await.unwrap().unwrap();
        assert_eq!(loaded, Sample { value: 7 });
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let loaded: Option<Sample> = read_json(&path).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn remove_dir_all_lenient_clears_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        tokio::fs::write(nested.join("f.json"), "{}").await.unwrap();
        remove_dir_all_lenient(&dir.path().join("a")).await.unwrap();
        assert!(!dir.path().join("a").exists());
    }

    #[tokio::test]
    async fn remove_dir_all_lenient_tolerates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        remove_dir_all_lenient(&dir.path().join("never-existed")).await.unwrap();
    }
}
