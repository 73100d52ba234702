//! Pairwise correlation among numeric features

use anyhow::Result;
use polars::prelude::*;
use rayon::prelude::*;

/// Absolute Pearson correlation above which a pair is reported.
pub const HIGH_CORRELATION_THRESHOLD: f64 = 0.8;

/// A highly correlated pair of numeric features.
#[derive(Debug, Clone)]
pub struct CorrelatedPair {
    pub feature1: String,
    pub feature2: String,
    pub correlation: f64,
}

/// Find feature pairs with |Pearson correlation| above `threshold`.
///
/// Only the strict upper triangle is scanned (no self-pairs, no duplicate
/// pairs) and each pair is computed over rows where both sides are non-null.
/// Results are sorted by absolute correlation, descending.
pub fn find_correlated_pairs(
    df: &DataFrame,
    numeric_cols: &[String],
    threshold: f64,
) -> Result<Vec<CorrelatedPair>> {
    if numeric_cols.len() < 2 {
        return Ok(Vec::new());
    }

    // Pre-cast once so the pairwise pass works on Float64 throughout.
    let float_columns: Vec<(String, Column)> = numeric_cols
        .iter()
        .filter_map(|name| {
            df.column(name)
                .ok()
                .and_then(|col| col.cast(&DataType::Float64).ok())
                .map(|col| (name.clone(), col))
        })
        .collect();

    let n = float_columns.len();
    let pairs: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect();

    let mut correlated: Vec<CorrelatedPair> = pairs
        .par_iter()
        .filter_map(|&(i, j)| {
            let (name1, col1) = &float_columns[i];
            let (name2, col2) = &float_columns[j];
            let corr = pairwise_pearson(col1, col2)?;
            if corr.abs() > threshold && !corr.is_nan() {
                Some(CorrelatedPair {
                    feature1: name1.clone(),
                    feature2: name2.clone(),
                    correlation: corr,
                })
            } else {
                None
            }
        })
        .collect();

    correlated.sort_by(|a, b| {
        b.correlation
            .abs()
            .partial_cmp(&a.correlation.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(correlated)
}

/// Single-pass Welford Pearson correlation over rows where both values are
/// present. Returns None for constant columns or fewer than two pairs.
fn pairwise_pearson(s1: &Column, s2: &Column) -> Option<f64> {
    let ca1 = s1.f64().ok()?;
    let ca2 = s2.f64().ok()?;
    if ca1.len() != ca2.len() {
        return None;
    }

    let mut count = 0.0;
    let mut mean_x = 0.0;
    let mut mean_y = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    let mut cov_xy = 0.0;

    for (x, y) in ca1.iter().zip(ca2.iter()) {
        if let (Some(x), Some(y)) = (x, y) {
            count += 1.0;
            let dx = x - mean_x;
            let dy = y - mean_y;
            mean_x += dx / count;
            mean_y += dy / count;
            var_x += dx * (x - mean_x);
            var_y += dy * (y - mean_y);
            cov_xy += dx * (y - mean_y);
        }
    }

    if count < 2.0 {
        return None;
    }
    let std_x = (var_x / count).sqrt();
    let std_y = (var_y / count).sqrt();
    if std_x == 0.0 || std_y == 0.0 {
        return None;
    }
    Some(cov_xy / (count * std_x * std_y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_perfectly_correlated_pair_found() {
        let df = df! {
            "a" => [1.0f64, 2.0, 3.0, 4.0, 5.0],
            "b" => [2.0f64, 4.0, 6.0, 8.0, 10.0],
            "noise" => [5.0f64, -3.0, 8.0, 1.0, -9.0],
        }
        .unwrap();

        let pairs =
            find_correlated_pairs(&df, &names(&["a", "b", "noise"]), 0.8).unwrap();

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].feature1, "a");
        assert_eq!(pairs[0].feature2, "b");
        assert!((pairs[0].correlation - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_upper_triangle_no_duplicates() {
        let df = df! {
            "a" => [1.0f64, 2.0, 3.0, 4.0],
            "b" => [1.0f64, 2.0, 3.0, 4.0],
            "c" => [4.0f64, 3.0, 2.0, 1.0],
        }
        .unwrap();

        let pairs = find_correlated_pairs(&df, &names(&["a", "b", "c"]), 0.5).unwrap();

        // 3 columns -> 3 unique pairs, all perfectly (anti-)correlated.
        assert_eq!(pairs.len(), 3);
        for pair in &pairs {
            assert_ne!(pair.feature1, pair.feature2);
        }
    }

    #[test]
    fn test_nulls_excluded_pairwise() {
        let df = df! {
            "a" => [Some(1.0f64), Some(2.0), None, Some(4.0), Some(5.0)],
            "b" => [Some(2.0f64), Some(4.0), Some(100.0), Some(8.0), Some(10.0)],
        }
        .unwrap();

        let pairs = find_correlated_pairs(&df, &names(&["a", "b"]), 0.8).unwrap();
        assert_eq!(pairs.len(), 1);
        assert!((pairs[0].correlation - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_column_skipped() {
        let df = df! {
            "a" => [1.0f64, 2.0, 3.0],
            "constant" => [7.0f64, 7.0, 7.0],
        }
        .unwrap();

        let pairs = find_correlated_pairs(&df, &names(&["a", "constant"]), 0.1).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_fewer_than_two_columns() {
        let df = df! { "a" => [1.0f64, 2.0] }.unwrap();
        let pairs = find_correlated_pairs(&df, &names(&["a"]), 0.5).unwrap();
        assert!(pairs.is_empty());
    }
}
