//! Stratified train/test splitting with index reports on disk.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;
use rand::prelude::*;
use rand::rngs::StdRng;

use super::TARGET_COLUMN;
use crate::utils::print_count;

/// Fraction of rows held out for the test set.
pub const TEST_FRACTION: f64 = 0.15;

/// Seed used for the stratified shuffle; fixed for reproducibility.
pub const SPLIT_SEED: u64 = 42;

/// Row indices of the train and test partitions, each sorted ascending.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified train/test split on the denial label.
///
/// Rows are grouped by label value (a possible null stratum included),
/// shuffled per stratum with a seeded RNG, and the test share is taken
/// from the front of each stratum. Index lists come back sorted ascending
/// so the partitions are stable regardless of shuffle order.
pub fn create_train_test_splits(df: &DataFrame, seed: u64) -> Result<TrainTestSplit> {
    let labels: Vec<Option<bool>> = df
        .column(TARGET_COLUMN)
        .with_context(|| format!("Split requires the '{}' column", TARGET_COLUMN))?
        .bool()?
        .into_iter()
        .collect();

    let mut strata: BTreeMap<Option<bool>, Vec<usize>> = BTreeMap::new();
    for (row, label) in labels.iter().enumerate() {
        strata.entry(*label).or_default().push(row);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(df.height());
    let mut test = Vec::with_capacity((df.height() as f64 * TEST_FRACTION) as usize + 1);

    for indices in strata.values() {
        let mut shuffled = indices.clone();
        shuffled.shuffle(&mut rng);
        let test_n = (shuffled.len() as f64 * TEST_FRACTION).round() as usize;
        test.extend_from_slice(&shuffled[..test_n]);
        train.extend_from_slice(&shuffled[test_n..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(TrainTestSplit { train, test })
}

/// Write an index partition as a one-column CSV with an `index` header.
pub fn write_index_report(path: &Path, indices: &[usize]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create index report {}", path.display()))?;
    writeln!(file, "index")?;
    for index in indices {
        writeln!(file, "{index}")?;
    }
    Ok(())
}

/// Read an index partition written by [`write_index_report`].
pub fn read_index_report(path: &Path) -> Result<Vec<usize>> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open index report {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let header = lines
        .next()
        .transpose()?
        .with_context(|| format!("Index report {} is empty", path.display()))?;
    if header.trim() != "index" {
        anyhow::bail!(
            "Index report {} has unexpected header '{}'",
            path.display(),
            header.trim()
        );
    }

    let mut indices = Vec::new();
    for line in lines {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let index: usize = trimmed
            .parse()
            .with_context(|| format!("Invalid row index '{}' in {}", trimmed, path.display()))?;
        indices.push(index);
    }
    Ok(indices)
}

/// Split the modeling table and persist both index partitions.
pub fn run_split(settings: &crate::config::Settings, df: &DataFrame) -> Result<TrainTestSplit> {
    let split = create_train_test_splits(df, SPLIT_SEED)?;
    write_index_report(&settings.path("train_index")?, &split.train)?;
    write_index_report(&settings.path("test_index")?, &split.test)?;
    print_count("training row(s)", split.train.len(), None);
    print_count("test row(s)", split.test.len(), None);
    Ok(split)
}
