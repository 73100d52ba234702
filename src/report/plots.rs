//! Diagnostic figure rendering as PNG.
//!
//! The bitmap backend is compiled without a font stack, so every figure is
//! drawn as bare geometry with a fixed frame and no text. File names carry
//! the meaning.

use std::path::Path;

use anyhow::Result;
use plotters::prelude::*;

const FIGURE_SIZE: (u32, u32) = (800, 600);
const CALIBRATION_BINS: usize = 10;
const PROBABILITY_BINS: usize = 40;

/// ROC curve: false positive rate against true positive rate, with the
/// chance diagonal for reference.
pub fn plot_roc_curve(path: &Path, y_true: &[bool], y_prob: &[f64]) -> Result<()> {
    let positives = y_true.iter().filter(|&&v| v).count();
    let negatives = y_true.len() - positives;
    anyhow::ensure!(
        positives > 0 && negatives > 0,
        "ROC curve needs both classes present"
    );

    let mut order: Vec<usize> = (0..y_prob.len()).collect();
    order.sort_by(|&a, &b| {
        y_prob[b]
            .partial_cmp(&y_prob[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut points = vec![(0.0, 0.0)];
    let mut tp = 0usize;
    let mut fp = 0usize;
    for &idx in &order {
        if y_true[idx] {
            tp += 1;
        } else {
            fp += 1;
        }
        points.push((fp as f64 / negatives as f64, tp as f64 / positives as f64));
    }

    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(0.0..1.0, 0.0..1.0)
        .map_err(plot_error)?;
    chart
        .draw_series(LineSeries::new(vec![(0.0, 0.0), (1.0, 1.0)], &BLACK.mix(0.3)))
        .map_err(plot_error)?;
    chart
        .draw_series(LineSeries::new(points, &BLUE))
        .map_err(plot_error)?;
    root.present().map_err(plot_error)?;
    Ok(())
}

/// Precision-recall curve: recall against precision at each score cut.
pub fn plot_pr_curve(path: &Path, y_true: &[bool], y_prob: &[f64]) -> Result<()> {
    let positives = y_true.iter().filter(|&&v| v).count();
    anyhow::ensure!(positives > 0, "PR curve needs at least one positive");

    let mut order: Vec<usize> = (0..y_prob.len()).collect();
    order.sort_by(|&a, &b| {
        y_prob[b]
            .partial_cmp(&y_prob[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut points = Vec::with_capacity(order.len());
    let mut tp = 0usize;
    for (seen, &idx) in order.iter().enumerate() {
        if y_true[idx] {
            tp += 1;
        }
        let precision = tp as f64 / (seen + 1) as f64;
        let recall = tp as f64 / positives as f64;
        points.push((recall, precision));
    }

    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(0.0..1.0, 0.0..1.0)
        .map_err(plot_error)?;
    chart
        .draw_series(LineSeries::new(points, &RED))
        .map_err(plot_error)?;
    root.present().map_err(plot_error)?;
    Ok(())
}

/// Calibration curve: mean predicted probability against observed positive
/// rate over equal-width probability bins, with the identity diagonal.
pub fn plot_calibration_curve(path: &Path, y_true: &[bool], y_prob: &[f64]) -> Result<()> {
    let mut bin_prob_sum = vec![0.0; CALIBRATION_BINS];
    let mut bin_positive = vec![0usize; CALIBRATION_BINS];
    let mut bin_count = vec![0usize; CALIBRATION_BINS];

    for (&truth, &prob) in y_true.iter().zip(y_prob) {
        let bin = ((prob * CALIBRATION_BINS as f64) as usize).min(CALIBRATION_BINS - 1);
        bin_prob_sum[bin] += prob;
        bin_count[bin] += 1;
        if truth {
            bin_positive[bin] += 1;
        }
    }

    let points: Vec<(f64, f64)> = (0..CALIBRATION_BINS)
        .filter(|&bin| bin_count[bin] > 0)
        .map(|bin| {
            (
                bin_prob_sum[bin] / bin_count[bin] as f64,
                bin_positive[bin] as f64 / bin_count[bin] as f64,
            )
        })
        .collect();

    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(0.0..1.0, 0.0..1.0)
        .map_err(plot_error)?;
    chart
        .draw_series(LineSeries::new(vec![(0.0, 0.0), (1.0, 1.0)], &BLACK.mix(0.3)))
        .map_err(plot_error)?;
    chart
        .draw_series(LineSeries::new(points.clone(), &GREEN))
        .map_err(plot_error)?;
    chart
        .draw_series(points.iter().map(|&(x, y)| Circle::new((x, y), 3, GREEN.filled())))
        .map_err(plot_error)?;
    root.present().map_err(plot_error)?;
    Ok(())
}

/// Overlaid predicted-probability histograms for the two classes, each
/// normalized to its own class size.
pub fn plot_probability_histograms(path: &Path, y_true: &[bool], y_prob: &[f64]) -> Result<()> {
    let mut positive_counts = vec![0usize; PROBABILITY_BINS];
    let mut negative_counts = vec![0usize; PROBABILITY_BINS];
    for (&truth, &prob) in y_true.iter().zip(y_prob) {
        let bin = ((prob * PROBABILITY_BINS as f64) as usize).min(PROBABILITY_BINS - 1);
        if truth {
            positive_counts[bin] += 1;
        } else {
            negative_counts[bin] += 1;
        }
    }
    let positives = y_true.iter().filter(|&&v| v).count().max(1) as f64;
    let negatives = (y_true.len() - y_true.iter().filter(|&&v| v).count()).max(1) as f64;

    let max_share = positive_counts
        .iter()
        .map(|&c| c as f64 / positives)
        .chain(negative_counts.iter().map(|&c| c as f64 / negatives))
        .fold(0.0, f64::max)
        .max(f64::MIN_POSITIVE);

    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(0.0..1.0, 0.0..max_share * 1.05)
        .map_err(plot_error)?;

    let width = 1.0 / PROBABILITY_BINS as f64;
    chart
        .draw_series((0..PROBABILITY_BINS).map(|bin| {
            let x0 = bin as f64 * width;
            let share = negative_counts[bin] as f64 / negatives;
            Rectangle::new([(x0, 0.0), (x0 + width, share)], BLUE.mix(0.4).filled())
        }))
        .map_err(plot_error)?;
    chart
        .draw_series((0..PROBABILITY_BINS).map(|bin| {
            let x0 = bin as f64 * width;
            let share = positive_counts[bin] as f64 / positives;
            Rectangle::new([(x0, 0.0), (x0 + width, share)], RED.mix(0.4).filled())
        }))
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    Ok(())
}

/// Histogram of a numeric feature over equal-width bins.
pub fn plot_numeric_histogram(path: &Path, values: &[f64], bins: usize) -> Result<()> {
    anyhow::ensure!(bins > 0, "Histogram needs at least one bin");
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    anyhow::ensure!(!finite.is_empty(), "Histogram needs at least one finite value");

    let min = finite.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = finite.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = if max > min { max - min } else { 1.0 };

    let mut counts = vec![0usize; bins];
    for &value in &finite {
        let bin = (((value - min) / span) * bins as f64) as usize;
        counts[bin.min(bins - 1)] += 1;
    }
    let max_count = counts.iter().cloned().max().unwrap_or(1).max(1) as f64;

    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(min..(min + span), 0.0..max_count * 1.05)
        .map_err(plot_error)?;

    let width = span / bins as f64;
    chart
        .draw_series(counts.iter().enumerate().map(|(bin, &count)| {
            let x0 = min + bin as f64 * width;
            Rectangle::new([(x0, 0.0), (x0 + width, count as f64)], BLUE.mix(0.6).filled())
        }))
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    Ok(())
}

fn plot_error<E: std::fmt::Display>(err: E) -> anyhow::Error {
    anyhow::anyhow!("Failed to render figure: {err}")
}
