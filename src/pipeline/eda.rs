//! Exploratory data analysis over the cleaned table
//!
//! Every function here is read-only: it takes the cleaned table by reference
//! and returns a result vector, never mutating its input.

use std::collections::HashMap;

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::config::{EdaConfig, SemanticType, Settings};
use crate::pipeline::correlation::{find_correlated_pairs, HIGH_CORRELATION_THRESHOLD};
use crate::pipeline::{column_to_strings, TARGET_COLUMN};
use crate::report::plots;
use crate::utils::stats;
use crate::utils::{print_count, print_info, print_step_header};

/// A categorical column is flagged when its least-frequent observed value's
/// share of non-null rows falls below this.
pub const RARE_SHARE_THRESHOLD: f64 = 0.001;

/// Minimum group size before a 0/1 denial rate counts as perfect separation.
pub const SEPARATION_MIN_COUNT: u64 = 50;

/// A categorical column is flagged when its per-group denial rate spans more
/// than this between the minimum and maximum group.
pub const RATE_RANGE_THRESHOLD: f64 = 0.15;

/// Distribution diagnostics for one numeric column that exceeded at least
/// one configured threshold.
#[derive(Debug, Clone)]
pub struct NumericReview {
    pub feature: String,
    pub skew: Option<f64>,
    pub kurtosis: Option<f64>,
    pub outlier_pct: f64,
    pub skew_flagged: bool,
    pub kurtosis_flagged: bool,
    pub outlier_flagged: bool,
}

/// A category whose share of non-null rows is below the rare threshold.
#[derive(Debug, Clone)]
pub struct RareCategory {
    pub feature: String,
    pub category: String,
    pub share: f64,
}

/// A categorical group whose denial rate is exactly 0 or 1 with enough
/// support to matter.
#[derive(Debug, Clone)]
pub struct SeparatedGroup {
    pub feature: String,
    pub category: String,
    pub denial_rate: f64,
    pub count: u64,
}

/// A categorical column whose per-group denial rate range is large.
#[derive(Debug, Clone)]
pub struct RateRange {
    pub feature: String,
    pub min_rate: f64,
    pub max_rate: f64,
    pub range: f64,
}

/// How a feature's association with the target was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationMethod {
    PointBiserial,
    CramersV,
}

/// Association strength between one feature and the denial target.
#[derive(Debug, Clone)]
pub struct TargetAssociation {
    pub feature: String,
    pub method: AssociationMethod,
    pub value: f64,
}

/// Schema-declared numeric columns present in the table with more than one
/// distinct non-null value.
pub fn numeric_feature_columns(df: &DataFrame, settings: &Settings) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for name in settings.schema.columns_by_type(SemanticType::Numeric) {
        let Ok(col) = df.column(&name) else {
            continue;
        };
        let distinct = col.as_materialized_series().drop_nulls().n_unique()?;
        if distinct > 1 {
            out.push(name);
        }
    }
    Ok(out)
}

/// Schema-declared categorical columns present in the table.
pub fn categorical_feature_columns(df: &DataFrame, settings: &Settings) -> Vec<String> {
    settings
        .schema
        .columns_by_type(SemanticType::Categorical)
        .into_iter()
        .filter(|name| df.column(name).is_ok() && name != TARGET_COLUMN)
        .collect()
}

/// Compute skew, excess kurtosis and the 1.5×IQR outlier rate per numeric
/// column, returning only columns that exceed at least one threshold.
///
/// Moments exclude nulls/NaNs; the outlier rate's denominator is the full
/// row count, so missing rows dilute it.
pub fn review_numeric_features(
    df: &DataFrame,
    numeric_cols: &[String],
    cfg: &EdaConfig,
) -> Result<Vec<NumericReview>> {
    let mut reviews = Vec::new();
    let height = df.height();

    for name in numeric_cols {
        let col = df
            .column(name)
            .with_context(|| format!("Numeric column '{}' not found", name))?
            .cast(&DataType::Float64)?;
        let values: Vec<f64> = col
            .f64()?
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .collect();
        if values.len() < 2 || height == 0 {
            continue;
        }

        let skew = stats::skewness(&values);
        let kurtosis = stats::kurtosis(&values);

        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let q1 = stats::quantile_sorted(&sorted, 0.25).unwrap_or(f64::NAN);
        let q3 = stats::quantile_sorted(&sorted, 0.75).unwrap_or(f64::NAN);
        let iqr = q3 - q1;
        let lower = q1 - 1.5 * iqr;
        let upper = q3 + 1.5 * iqr;
        let outliers = values.iter().filter(|&&v| v < lower || v > upper).count();
        let outlier_pct = outliers as f64 / height as f64;

        let skew_flagged = skew.is_some_and(|s| s.abs() > cfg.skew_threshold);
        let kurtosis_flagged = kurtosis.is_some_and(|k| k.abs() > cfg.kurtosis_threshold);
        let outlier_flagged = outlier_pct > cfg.outlier_threshold;

        if skew_flagged || kurtosis_flagged || outlier_flagged {
            reviews.push(NumericReview {
                feature: name.clone(),
                skew,
                kurtosis,
                outlier_pct,
                skew_flagged,
                kurtosis_flagged,
                outlier_flagged,
            });
        }
    }
    Ok(reviews)
}

/// Flag categorical columns whose least-frequent observed value is rare.
pub fn find_rare_categories(df: &DataFrame, cat_cols: &[String]) -> Result<Vec<RareCategory>> {
    let mut rare = Vec::new();

    for name in cat_cols {
        let values = column_to_strings(df.column(name)?)?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        let mut total = 0u64;
        for value in values.into_iter().flatten() {
            *counts.entry(value).or_insert(0) += 1;
            total += 1;
        }
        if total == 0 {
            continue;
        }

        if let Some((category, &count)) = counts
            .iter()
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
        {
            let share = count as f64 / total as f64;
            if share < RARE_SHARE_THRESHOLD {
                rare.push(RareCategory {
                    feature: name.clone(),
                    category: category.clone(),
                    share,
                });
            }
        }
    }

    rare.sort_by(|a, b| {
        a.share
            .partial_cmp(&b.share)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(rare)
}

/// Per-category denial rates for one column, computed over rows where both
/// the category and the target are present.
fn group_denial_rates(
    df: &DataFrame,
    column: &str,
    target: &str,
) -> Result<HashMap<String, (u64, u64)>> {
    let categories = column_to_strings(df.column(column)?)?;
    let targets: Vec<Option<bool>> = df.column(target)?.bool()?.into_iter().collect();

    let mut groups: HashMap<String, (u64, u64)> = HashMap::new();
    for (category, target) in categories.into_iter().zip(targets) {
        if let (Some(category), Some(denied)) = (category, target) {
            let entry = groups.entry(category).or_insert((0, 0));
            entry.0 += u64::from(denied);
            entry.1 += 1;
        }
    }
    Ok(groups)
}

/// Detect categorical groups that perfectly separate the target: a denial
/// rate of exactly 0 or 1 with at least [`SEPARATION_MIN_COUNT`] rows.
/// Sorted by feature, rate, then descending count.
pub fn find_perfect_separation(
    df: &DataFrame,
    cat_cols: &[String],
    target: &str,
) -> Result<Vec<SeparatedGroup>> {
    let mut separated = Vec::new();

    for name in cat_cols {
        for (category, (denied, count)) in group_denial_rates(df, name, target)? {
            if count < SEPARATION_MIN_COUNT {
                continue;
            }
            let rate = denied as f64 / count as f64;
            if rate == 0.0 || rate == 1.0 {
                separated.push(SeparatedGroup {
                    feature: name.clone(),
                    category,
                    denial_rate: rate,
                    count,
                });
            }
        }
    }

    separated.sort_by(|a, b| {
        a.feature
            .cmp(&b.feature)
            .then_with(|| {
                a.denial_rate
                    .partial_cmp(&b.denial_rate)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.count.cmp(&a.count))
    });
    Ok(separated)
}

/// Flag categorical columns whose per-group denial rate spans more than
/// [`RATE_RANGE_THRESHOLD`], sorted descending by range.
pub fn find_large_rate_ranges(
    df: &DataFrame,
    cat_cols: &[String],
    target: &str,
) -> Result<Vec<RateRange>> {
    let mut ranges = Vec::new();

    for name in cat_cols {
        let groups = group_denial_rates(df, name, target)?;
        let rates: Vec<f64> = groups
            .values()
            .filter(|(_, count)| *count > 0)
            .map(|(denied, count)| *denied as f64 / *count as f64)
            .collect();
        if rates.len() < 2 {
            continue;
        }
        let min_rate = rates.iter().copied().fold(f64::INFINITY, f64::min);
        let max_rate = rates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max_rate - min_rate;
        if range > RATE_RANGE_THRESHOLD {
            ranges.push(RateRange {
                feature: name.clone(),
                min_rate,
                max_rate,
                range,
            });
        }
    }

    ranges.sort_by(|a, b| {
        b.range
            .partial_cmp(&a.range)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(ranges)
}

/// Measure each feature's association with the binary target: point-biserial
/// correlation for numeric features, Cramér's V for categoricals. Features
/// with fewer than two distinct values are skipped.
pub fn correlate_features_with_target(
    df: &DataFrame,
    numeric_cols: &[String],
    cat_cols: &[String],
    target: &str,
) -> Result<Vec<TargetAssociation>> {
    let targets: Vec<Option<bool>> = df.column(target)?.bool()?.into_iter().collect();
    let mut associations = Vec::new();

    for name in numeric_cols {
        let col = df.column(name)?.cast(&DataType::Float64)?;
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for (x, y) in col.f64()?.into_iter().zip(targets.iter()) {
            if let (Some(x), Some(y)) = (x, y) {
                xs.push(x);
                ys.push(f64::from(u8::from(*y)));
            }
        }
        if let Some(r) = stats::pearson(&xs, &ys) {
            associations.push(TargetAssociation {
                feature: name.clone(),
                method: AssociationMethod::PointBiserial,
                value: r,
            });
        }
    }

    for name in cat_cols {
        let categories = column_to_strings(df.column(name)?)?;
        if let Some(v) = cramers_v(&categories, &targets) {
            associations.push(TargetAssociation {
                feature: name.clone(),
                method: AssociationMethod::CramersV,
                value: v,
            });
        }
    }

    Ok(associations)
}

/// Cramér's V between a categorical column and the binary target, from the
/// chi-square statistic of their contingency table.
fn cramers_v(categories: &[Option<String>], targets: &[Option<bool>]) -> Option<f64> {
    let mut table: HashMap<(String, bool), f64> = HashMap::new();
    let mut row_totals: HashMap<String, f64> = HashMap::new();
    let mut col_totals: HashMap<bool, f64> = HashMap::new();
    let mut n = 0.0;

    for (category, target) in categories.iter().zip(targets.iter()) {
        if let (Some(category), Some(target)) = (category, target) {
            *table.entry((category.clone(), *target)).or_insert(0.0) += 1.0;
            *row_totals.entry(category.clone()).or_insert(0.0) += 1.0;
            *col_totals.entry(*target).or_insert(0.0) += 1.0;
            n += 1.0;
        }
    }

    let r = row_totals.len();
    let c = col_totals.len();
    if n == 0.0 || r < 2 || c < 2 {
        return None;
    }

    let mut chi2 = 0.0;
    for (category, row_total) in &row_totals {
        for (target, col_total) in &col_totals {
            let expected = row_total * col_total / n;
            if expected > 0.0 {
                let observed = table
                    .get(&(category.clone(), *target))
                    .copied()
                    .unwrap_or(0.0);
                chi2 += (observed - expected).powi(2) / expected;
            }
        }
    }

    let min_dim = (r.min(c) - 1) as f64;
    Some((chi2 / (n * min_dim)).sqrt())
}

/// Everything the EDA stage reports for one cleaned table.
#[derive(Debug, Default)]
pub struct EdaReport {
    pub numeric_reviews: Vec<NumericReview>,
    pub rare_categories: Vec<RareCategory>,
    pub separated_groups: Vec<SeparatedGroup>,
    pub rate_ranges: Vec<RateRange>,
    pub correlated_pairs: Vec<crate::pipeline::correlation::CorrelatedPair>,
    pub target_associations: Vec<TargetAssociation>,
}

/// Run the full EDA stage, rendering a histogram per flagged numeric column
/// into the configured figures directory.
pub fn run_eda(settings: &Settings, df: &DataFrame) -> Result<EdaReport> {
    let numeric_cols = numeric_feature_columns(df, settings)?;
    let cat_cols = categorical_feature_columns(df, settings);

    print_step_header(1, "Numeric distribution review");
    let numeric_reviews = review_numeric_features(df, &numeric_cols, &settings.eda)?;
    print_count("numeric column(s) flagged for review", numeric_reviews.len(), None);

    let figures_dir = settings.path("figures_dir")?;
    std::fs::create_dir_all(&figures_dir)?;
    for review in &numeric_reviews {
        let col = df.column(&review.feature)?.cast(&DataType::Float64)?;
        let values: Vec<f64> = col
            .f64()?
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .collect();
        let path = figures_dir.join(format!("eda_{}_hist.png", review.feature));
        plots::plot_numeric_histogram(&path, &values, 40)?;
    }

    print_step_header(2, "Categorical diagnostics");
    let rare_categories = find_rare_categories(df, &cat_cols)?;
    let separated_groups = find_perfect_separation(df, &cat_cols, TARGET_COLUMN)?;
    let rate_ranges = find_large_rate_ranges(df, &cat_cols, TARGET_COLUMN)?;
    print_count("rare categorical value(s)", rare_categories.len(), None);
    print_count("perfectly separating group(s)", separated_groups.len(), None);
    print_count("column(s) with a large denial-rate range", rate_ranges.len(), None);

    print_step_header(3, "Correlation analysis");
    let correlated_pairs = find_correlated_pairs(df, &numeric_cols, HIGH_CORRELATION_THRESHOLD)?;
    let target_associations =
        correlate_features_with_target(df, &numeric_cols, &cat_cols, TARGET_COLUMN)?;
    print_count("highly correlated numeric pair(s)", correlated_pairs.len(), None);
    print_info(&format!(
        "{} feature-target association(s) computed",
        target_associations.len()
    ));

    Ok(EdaReport {
        numeric_reviews,
        rare_categories,
        separated_groups,
        rate_ranges,
        correlated_pairs,
        target_associations,
    })
}
