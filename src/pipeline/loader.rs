//! Parquet persistence for pipeline stages
//!
//! Every stage reads its input table fully, transforms it, and writes the
//! full result. Tables are addressed by logical keys from `paths.yaml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::config::Settings;

/// Load a stage table by logical path key.
pub fn load_parquet(settings: &Settings, key: &str) -> Result<DataFrame> {
    let path = settings.path(key)?;
    load_parquet_path(&path)
}

/// Load a Parquet file into memory.
pub fn load_parquet_path(path: &Path) -> Result<DataFrame> {
    LazyFrame::scan_parquet(path, Default::default())
        .with_context(|| format!("Failed to open Parquet file: {}", path.display()))?
        .collect()
        .with_context(|| format!("Failed to load Parquet file: {}", path.display()))
}

/// Persist a stage table under a logical path key, creating parent
/// directories as needed. Returns the resolved path.
pub fn save_parquet(df: &mut DataFrame, settings: &Settings, key: &str) -> Result<PathBuf> {
    let path = settings.path(key)?;
    save_parquet_path(df, &path)?;
    Ok(path)
}

/// Write a DataFrame to a Snappy-compressed Parquet file.
pub fn save_parquet_path(df: &mut DataFrame, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Snappy)
        .finish(df)
        .with_context(|| format!("Failed to write Parquet file: {}", path.display()))?;
    Ok(())
}

/// Create the parent directory of `path` if it does not exist.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parquet_round_trip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/processed/table.parquet");

        let mut df = df! {
            "loan_amount" => [100.0f64, 250.0, 80.0],
            "denied_flag" => [false, true, false],
        }
        .unwrap();

        save_parquet_path(&mut df, &path).unwrap();
        let loaded = load_parquet_path(&path).unwrap();

        assert_eq!(loaded.shape(), (3, 2));
        assert!(loaded.equals(&df));
    }
}
