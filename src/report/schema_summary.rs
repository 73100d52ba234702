//! Per-column schema summary: observed dtype, missingness, cardinality and
//! sample values, exported as CSV and rendered as a terminal table.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;
use polars::prelude::*;

use crate::config::SchemaConfig;

/// Maximum length of the sample-values cell before truncation.
const SAMPLE_MAX_CHARS: usize = 120;

/// Number of distinct sample values collected per column.
const SAMPLE_VALUE_COUNT: usize = 5;

/// One row of the schema summary report.
#[derive(Debug, Clone)]
pub struct ColumnSummary {
    pub column: String,
    pub dtype: String,
    pub missing_pct: f64,
    pub unique: usize,
    pub sample: String,
    pub notes: String,
}

/// Summarize every column of `df`, pulling notes from the declared schema
/// where a column is covered by it.
pub fn generate_schema_summary(df: &DataFrame, schema: &SchemaConfig) -> Result<Vec<ColumnSummary>> {
    let height = df.height().max(1) as f64;
    let mut summaries = Vec::with_capacity(df.width());

    for col in df.get_columns() {
        let name = col.name().to_string();
        let missing_pct = col.null_count() as f64 / height * 100.0;
        let unique = col.as_materialized_series().n_unique()?;

        let sample = sample_values(col)?;
        let notes = schema
            .spec(&name)
            .and_then(|spec| spec.notes.clone())
            .unwrap_or_default();

        summaries.push(ColumnSummary {
            column: name,
            dtype: col.dtype().to_string(),
            missing_pct,
            unique,
            sample,
            notes,
        });
    }
    Ok(summaries)
}

fn sample_values(col: &Column) -> Result<String> {
    let mut values = Vec::new();
    let stringified = col.cast(&DataType::String)?;
    for value in stringified.str()?.into_iter().flatten() {
        if !values.contains(&value.to_string()) {
            values.push(value.to_string());
        }
        if values.len() >= SAMPLE_VALUE_COUNT {
            break;
        }
    }
    let mut joined = values.join(", ");
    if joined.chars().count() > SAMPLE_MAX_CHARS {
        joined = joined.chars().take(SAMPLE_MAX_CHARS - 1).collect::<String>() + "…";
    }
    Ok(joined)
}

/// Write the summary as CSV with quoted fields where needed.
pub fn write_schema_summary(path: &Path, summaries: &[ColumnSummary]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create schema summary {}", path.display()))?;
    writeln!(file, "column,dtype,missing_pct,unique,sample,notes")?;
    for row in summaries {
        writeln!(
            file,
            "{},{},{:.4},{},{},{}",
            escape_csv_field(&row.column),
            escape_csv_field(&row.dtype),
            row.missing_pct,
            row.unique,
            escape_csv_field(&row.sample),
            escape_csv_field(&row.notes),
        )?;
    }
    Ok(())
}

/// Quote a CSV field when it contains a comma, quote or newline.
pub fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render the summary as a terminal table.
pub fn display_schema_summary(summaries: &[ColumnSummary]) {
    println!();
    println!(
        "    {} {}",
        style("📋").cyan(),
        style("SCHEMA SUMMARY").white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Column").add_attribute(Attribute::Bold),
        Cell::new("Dtype").add_attribute(Attribute::Bold),
        Cell::new("Missing %").add_attribute(Attribute::Bold),
        Cell::new("Unique").add_attribute(Attribute::Bold),
        Cell::new("Notes").add_attribute(Attribute::Bold),
    ]);

    for row in summaries {
        let missing_color = if row.missing_pct > 50.0 {
            Color::Red
        } else if row.missing_pct > 10.0 {
            Color::Yellow
        } else {
            Color::White
        };
        table.add_row(vec![
            Cell::new(&row.column),
            Cell::new(&row.dtype),
            Cell::new(format!("{:.1}%", row.missing_pct)).fg(missing_color),
            Cell::new(row.unique),
            Cell::new(&row.notes),
        ]);
    }

    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}
