//! HMDA denial modeling pipeline CLI
//!
//! Stage-by-stage driver for the 2024 HMDA loan-denial pipeline: raw
//! ingestion, schema-driven cleaning, exploratory analysis, feature
//! engineering and logistic regression training.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use polars::prelude::*;

use hmda_pipeline::cli::{Cli, Commands};
use hmda_pipeline::config::Settings;
use hmda_pipeline::pipeline::{self, load_parquet, save_parquet, TARGET_COLUMN};
use hmda_pipeline::report;
use hmda_pipeline::utils::{print_info, print_success};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.root {
        Some(root) => Settings::from_root(root.clone())?,
        None => Settings::load()?,
    };

    print_banner(env!("CARGO_PKG_VERSION"));
    let start = Instant::now();

    match &cli.command {
        Commands::Convert { input, output } => {
            let input = match input {
                Some(path) => path.clone(),
                None => settings.path("hmda_2024_raw")?,
            };
            let output = match output {
                Some(path) => path.clone(),
                None => settings.path("hmda_2024_interim")?,
            };
            hmda_pipeline::cli::convert::run_convert(&input, &output)?;
        }
        Commands::Clean => {
            let df = load_parquet(&settings, "hmda_2024_interim")?;
            print_info(&format!("Loaded {} rows × {} columns", df.height(), df.width()));
            let mut cleaned = pipeline::run_cleaning(&settings, df)?;
            save_parquet(&mut cleaned, &settings, "hmda_2024_clean")?;
            print_success("Cleaned table written");
        }
        Commands::Summarize => {
            let df = load_parquet(&settings, "hmda_2024_clean")?;
            let summaries = report::generate_schema_summary(&df, &settings.schema)?;
            let path = settings.path("schema_summary")?;
            report::write_schema_summary(&path, &summaries)?;
            report::display_schema_summary(&summaries);
            print_success(&format!("Schema summary written to {}", path.display()));
        }
        Commands::Eda => {
            let df = load_parquet(&settings, "hmda_2024_clean")?;
            pipeline::run_eda(&settings, &df)?;
        }
        Commands::Features => {
            let df = load_parquet(&settings, "hmda_2024_clean")?;
            let mut features = pipeline::run_feature_engineering(&settings, df)?;
            save_parquet(&mut features, &settings, "hmda_2024_features")?;
            print_success("Feature table written");
        }
        Commands::Split => {
            let df = load_parquet(&settings, "hmda_2024_features")?;
            let mut model_df = freeze_modeling_table(&df)?;
            save_parquet(&mut model_df, &settings, "hmda_2024_model")?;
            print_info(&format!(
                "Modeling table: {} rows × {} columns",
                model_df.height(),
                model_df.width()
            ));
            pipeline::run_split(&settings, &model_df)?;
            print_success("Train/test index reports written");
        }
        Commands::Train { sample } => {
            pipeline::run_training(&settings, *sample)?;
        }
        Commands::Compare { reports } => {
            let mut models = Vec::with_capacity(reports.len());
            for path in reports {
                let label = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("model")
                    .to_string();
                let rows = report::load_model_metrics(path)
                    .with_context(|| format!("Failed to load {}", path.display()))?;
                models.push((label, rows));
            }
            report::display_model_comparison(&models);
        }
    }

    print_completion(start.elapsed());
    Ok(())
}

/// Keep only columns the classifier can consume: numeric and boolean
/// features plus the denial label. Categorical and string columns that
/// survived feature engineering are reporting material, not model input.
fn freeze_modeling_table(df: &DataFrame) -> Result<DataFrame> {
    let keep: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|col| {
            col.name().as_str() == TARGET_COLUMN
                || col.dtype().is_primitive_numeric()
                || col.dtype() == &DataType::Boolean
        })
        .map(|col| col.name().to_string())
        .collect();
    anyhow::ensure!(
        keep.iter().any(|name| name == TARGET_COLUMN),
        "Feature table is missing the '{}' label column",
        TARGET_COLUMN
    );
    Ok(df.select(keep)?)
}

fn print_banner(version: &str) {
    println!();
    println!(
        " {} {} {}",
        style("◆").cyan().bold(),
        style("HMDA PIPELINE").white().bold(),
        style(format!("v{version}")).dim()
    );
    println!(" {}", style("─".repeat(60)).dim());
}

fn print_completion(elapsed: std::time::Duration) {
    println!();
    println!(
        " {} Done in {}",
        style("✓").green().bold(),
        style(format!("{:.2?}", elapsed)).yellow()
    );
}
