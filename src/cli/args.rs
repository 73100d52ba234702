//! Command-line argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// HMDA denial modeling pipeline: ingestion, cleaning, EDA, feature
/// engineering and logistic regression training
#[derive(Parser, Debug)]
#[command(name = "hmda-pipeline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project root directory. Defaults to the HMDA_PROJECT_ROOT environment
    /// variable, or the nearest ancestor containing a configs/ directory.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert the raw pipe-delimited LAR extract to Parquet
    Convert {
        /// Input file path (defaults to the configured raw dataset)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output Parquet path (defaults to the configured interim dataset)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Clean the converted table: sentinel handling, dtype coercion and
    /// the derived denial label
    Clean,

    /// Export a per-column schema summary of the cleaned table
    Summarize,

    /// Run exploratory analysis over the cleaned table
    Eda,

    /// Build the feature table: multi-hot, one-hot and imputation
    Features,

    /// Freeze the modeling table and write stratified train/test indices
    Split,

    /// Train and evaluate the elastic-net logistic regression
    Train {
        /// Train on a seeded random fraction of the training partition
        #[arg(long)]
        sample: Option<f64>,
    },

    /// Compare metric reports from multiple models side by side
    Compare {
        /// Paths to metric,score CSV files; labels come from file stems
        #[arg(required = true)]
        reports: Vec<PathBuf>,
    },
}
