//! Metric exports and terminal display for fitted models.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;

use crate::pipeline::model::EvaluationMetrics;

/// Write evaluation metrics as a two-column `metric,score` CSV.
pub fn write_metrics_csv(path: &Path, metrics: &EvaluationMetrics) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create metrics report {}", path.display()))?;
    writeln!(file, "metric,score")?;
    for (name, value) in metrics.rows() {
        writeln!(file, "{name},{value}")?;
    }
    Ok(())
}

/// Read a `metric,score` CSV back as name/value pairs.
pub fn load_model_metrics(path: &Path) -> Result<Vec<(String, f64)>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read metrics report {}", path.display()))?;
    let mut lines = content.lines();

    let header = lines
        .next()
        .with_context(|| format!("Metrics report {} is empty", path.display()))?;
    if header.trim() != "metric,score" {
        anyhow::bail!(
            "Metrics report {} has unexpected header '{}'",
            path.display(),
            header.trim()
        );
    }

    let mut rows = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let (name, value) = trimmed
            .split_once(',')
            .with_context(|| format!("Malformed metrics row '{}'", trimmed))?;
        let score: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("Invalid score '{}' for metric '{}'", value, name))?;
        rows.push((name.to_string(), score));
    }
    Ok(rows)
}

/// Render evaluation metrics as a terminal table.
pub fn display_metrics(metrics: &EvaluationMetrics) {
    println!();
    println!(
        "    {} {}",
        style("📊").cyan(),
        style("TEST SET METRICS").white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Metric").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);

    for (name, value) in metrics.rows() {
        let color = if value >= 0.8 {
            Color::Green
        } else if value >= 0.5 {
            Color::Yellow
        } else {
            Color::Red
        };
        table.add_row(vec![
            Cell::new(name),
            Cell::new(format!("{:.4}", value)).fg(color),
        ]);
    }

    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

/// Side-by-side comparison of several models' metric reports.
pub fn display_model_comparison(models: &[(String, Vec<(String, f64)>)]) {
    if models.is_empty() {
        return;
    }

    println!();
    println!(
        "    {} {}",
        style("⚖️").cyan(),
        style("MODEL COMPARISON").white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
    println!();

    let metric_names: Vec<&String> = models[0].1.iter().map(|(name, _)| name).collect();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    let mut header = vec![Cell::new("Metric").add_attribute(Attribute::Bold)];
    for (model_name, _) in models {
        header.push(Cell::new(model_name).add_attribute(Attribute::Bold));
    }
    table.set_header(header);

    for metric in metric_names {
        let mut row = vec![Cell::new(metric)];
        let scores: Vec<Option<f64>> = models
            .iter()
            .map(|(_, rows)| {
                rows.iter()
                    .find(|(name, _)| name == metric)
                    .map(|(_, score)| *score)
            })
            .collect();
        let best = scores
            .iter()
            .flatten()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        for score in scores {
            match score {
                Some(value) => {
                    let cell = Cell::new(format!("{:.4}", value));
                    row.push(if value == best {
                        cell.fg(Color::Green).add_attribute(Attribute::Bold)
                    } else {
                        cell
                    });
                }
                None => row.push(Cell::new("—").fg(Color::DarkGrey)),
            }
        }
        table.add_row(row);
    }

    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metrics() -> EvaluationMetrics {
        EvaluationMetrics {
            f1: 0.61,
            accuracy: 0.88,
            precision: 0.55,
            recall: 0.68,
            roc_auc: 0.83,
            pr_auc: 0.59,
        }
    }

    #[test]
    fn test_metrics_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let metrics = sample_metrics();

        write_metrics_csv(&path, &metrics).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("metric,score\n"));
        assert!(content.contains("f1,0.61"));

        let loaded = load_model_metrics(&path).unwrap();
        assert_eq!(loaded.len(), 6);
        assert_eq!(loaded[0], ("f1".to_string(), 0.61));
        assert_eq!(loaded[4], ("roc_auc".to_string(), 0.83));
    }

    #[test]
    fn test_load_rejects_bad_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "name,value\nf1,0.5\n").unwrap();
        assert!(load_model_metrics(&path).is_err());
    }
}
