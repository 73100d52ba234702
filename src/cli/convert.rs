//! Raw LAR text to Parquet conversion with streaming support

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use polars::prelude::*;

use crate::utils::create_spinner;

/// Field separator of the raw LAR extract.
const RAW_SEPARATOR: u8 = b'|';

/// Tokens treated as null on read, in every column.
const RAW_NULL_TOKENS: &[&str] = &["", "NA", "NULL"];

/// Convert the pipe-delimited LAR extract to Parquet.
///
/// Every column is read as a string: the raw extract mixes sentinel tokens
/// into numeric fields, so type decisions are deferred to the cleaning
/// stage. Streaming `sink_parquet` keeps memory flat for multi-gigabyte
/// extracts.
pub fn run_convert(input: &Path, output: &Path) -> Result<()> {
    println!("\n {} Converting raw extract to Parquet", style("◆").cyan().bold());
    println!("   Input:  {}", style(input.display()).dim());
    println!("   Output: {}", style(output.display()).dim());
    println!();

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let null_tokens: Vec<PlSmallStr> = RAW_NULL_TOKENS.iter().map(|t| (*t).into()).collect();

    let spinner = create_spinner("Reading schema...");
    let lf = LazyCsvReader::new(input)
        .with_separator(RAW_SEPARATOR)
        // Zero-row inference keeps every column as a string.
        .with_infer_schema_length(Some(0))
        .with_null_values(Some(NullValues::AllColumns(null_tokens)))
        .with_rechunk(false)
        .finish()
        .with_context(|| format!("Failed to read raw extract: {}", input.display()))?;

    let schema = lf.clone().collect_schema()?;
    let num_cols = schema.len();
    spinner.finish_with_message(format!(
        "{} Schema loaded ({} columns)",
        style("✓").green(),
        num_cols
    ));

    let spinner = create_spinner("Streaming to Parquet...");
    let parquet_options = ParquetWriteOptions {
        compression: ParquetCompression::Snappy,
        statistics: StatisticsOptions::full(),
        row_group_size: Some(100_000),
        ..Default::default()
    };
    lf.sink_parquet(&output, parquet_options, None)
        .with_context(|| format!("Failed to write Parquet file: {}", output.display()))?;
    spinner.finish_with_message(format!("{} Parquet written", style("✓").green()));

    let input_size = std::fs::metadata(input).map(|m| m.len()).unwrap_or(0) as f64
        / (1024.0 * 1024.0);
    let output_size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0) as f64
        / (1024.0 * 1024.0);
    let row_count = parquet_row_count(output).unwrap_or(0);

    println!();
    println!(
        "   {} rows × {} columns",
        style(row_count).yellow(),
        style(num_cols).yellow()
    );
    println!("   {} File sizes:", style("✧").cyan());
    println!("      Raw:     {:.2} MB", input_size);
    println!("      Parquet: {:.2} MB", output_size);
    println!();
    println!(" {} Conversion complete!", style("✓").green().bold());

    Ok(())
}

/// Row count from Parquet metadata, without a full scan.
fn parquet_row_count(path: &Path) -> Result<usize> {
    let lf = LazyFrame::scan_parquet(path, Default::default())?;
    let df = lf.select([len()]).collect()?;
    let count = df.column("len")?.get(0)?;
    match count {
        AnyValue::UInt32(n) => Ok(n as usize),
        AnyValue::UInt64(n) => Ok(n as usize),
        AnyValue::Int32(n) => Ok(n as usize),
        AnyValue::Int64(n) => Ok(n as usize),
        _ => Ok(0),
    }
}
