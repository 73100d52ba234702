//! Standardization and principal component analysis for the modeling matrix.
//!
//! Both transforms are fit on training rows only and persisted as JSON so the
//! exact transformation can be replayed on held-out data.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use faer::Mat;
use serde::{Deserialize, Serialize};

/// Number of principal components retained for modeling.
pub const NUM_PCA_COMPONENTS: usize = 22;

/// Per-column standardization: `z = (x - mean) / std`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub columns: Vec<String>,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl StandardScaler {
    /// Fit means and standard deviations over the rows of `x`.
    ///
    /// Constant columns get a unit standard deviation so transforming them
    /// yields zeros instead of NaN.
    pub fn fit(x: &[Vec<f64>], columns: &[String]) -> Result<Self> {
        let n = x.len();
        anyhow::ensure!(n > 0, "Cannot fit a scaler on an empty matrix");
        let d = x[0].len();
        anyhow::ensure!(
            d == columns.len(),
            "Matrix has {} columns but {} names were given",
            d,
            columns.len()
        );

        let mut means = vec![0.0; d];
        for row in x {
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value;
            }
        }
        for mean in &mut means {
            *mean /= n as f64;
        }

        let mut stds = vec![0.0; d];
        for row in x {
            for ((std, value), mean) in stds.iter_mut().zip(row).zip(&means) {
                let dev = value - mean;
                *std += dev * dev;
            }
        }
        for std in &mut stds {
            *std = (*std / n as f64).sqrt();
            if *std == 0.0 {
                *std = 1.0;
            }
        }

        Ok(Self {
            columns: columns.to_vec(),
            means,
            stds,
        })
    }

    /// Standardize `x` in place.
    pub fn transform(&self, x: &mut [Vec<f64>]) -> Result<()> {
        for row in x.iter_mut() {
            anyhow::ensure!(
                row.len() == self.means.len(),
                "Row width {} does not match fitted width {}",
                row.len(),
                self.means.len()
            );
            for ((value, mean), std) in row.iter_mut().zip(&self.means).zip(&self.stds) {
                *value = (*value - mean) / std;
            }
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

/// Principal component analysis fit on standardized data.
///
/// `components` holds one unit-length principal axis per row, ordered by
/// descending eigenvalue of the covariance matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pca {
    pub mean: Vec<f64>,
    pub components: Vec<Vec<f64>>,
    pub explained_variance: Vec<f64>,
}

impl Pca {
    /// Fit up to `n_components` principal axes on the rows of `x`.
    ///
    /// The covariance matrix is eigendecomposed with cyclic Jacobi rotations,
    /// which is exact for the symmetric matrices involved here and needs no
    /// solver dependency. Component count is capped at the feature width.
    pub fn fit(x: &[Vec<f64>], n_components: usize) -> Result<Self> {
        let n = x.len();
        anyhow::ensure!(n > 1, "PCA needs at least two rows");
        let d = x[0].len();
        let k = n_components.min(d);

        let mut mean = vec![0.0; d];
        for row in x {
            for (m, value) in mean.iter_mut().zip(row) {
                *m += value;
            }
        }
        for m in &mut mean {
            *m /= n as f64;
        }

        // Covariance = centered Xᵀ·X / (n - 1).
        let mut centered = Mat::<f64>::zeros(n, d);
        for (i, row) in x.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                centered[(i, j)] = value - mean[j];
            }
        }
        let mut cov = centered.transpose() * &centered;
        let scale = 1.0 / (n as f64 - 1.0);
        for i in 0..d {
            for j in 0..d {
                cov[(i, j)] *= scale;
            }
        }

        let (eigenvalues, eigenvectors) = jacobi_eigen(&cov);

        // Order axes by descending eigenvalue.
        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| {
            eigenvalues[b]
                .partial_cmp(&eigenvalues[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut components = Vec::with_capacity(k);
        let mut explained_variance = Vec::with_capacity(k);
        for &idx in order.iter().take(k) {
            let axis: Vec<f64> = (0..d).map(|row| eigenvectors[(row, idx)]).collect();
            components.push(axis);
            explained_variance.push(eigenvalues[idx].max(0.0));
        }

        Ok(Self {
            mean,
            components,
            explained_variance,
        })
    }

    /// Project rows onto the fitted axes.
    pub fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let d = self.mean.len();
        let mut projected = Vec::with_capacity(x.len());
        for row in x {
            anyhow::ensure!(
                row.len() == d,
                "Row width {} does not match fitted width {}",
                row.len(),
                d
            );
            let scores: Vec<f64> = self
                .components
                .iter()
                .map(|axis| {
                    axis.iter()
                        .zip(row)
                        .zip(&self.mean)
                        .map(|((a, value), mean)| a * (value - mean))
                        .sum()
                })
                .collect();
            projected.push(scores);
        }
        Ok(projected)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

/// Cyclic Jacobi eigendecomposition of a symmetric matrix.
///
/// Sweeps rotate out the largest off-diagonal mass until it falls below
/// 1e-12 or a sweep cap is hit. Returns eigenvalues and the matrix whose
/// columns are the matching eigenvectors.
fn jacobi_eigen(matrix: &Mat<f64>) -> (Vec<f64>, Mat<f64>) {
    let d = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Mat::<f64>::zeros(d, d);
    for i in 0..d {
        v[(i, i)] = 1.0;
    }

    const MAX_SWEEPS: usize = 100;
    const TOLERANCE: f64 = 1e-12;

    for _ in 0..MAX_SWEEPS {
        let mut off_diag = 0.0;
        for p in 0..d {
            for q in (p + 1)..d {
                off_diag += a[(p, q)] * a[(p, q)];
            }
        }
        if off_diag.sqrt() < TOLERANCE {
            break;
        }

        for p in 0..d {
            for q in (p + 1)..d {
                if a[(p, q)].abs() < f64::EPSILON {
                    continue;
                }
                let theta = (a[(q, q)] - a[(p, p)]) / (2.0 * a[(p, q)]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for i in 0..d {
                    let aip = a[(i, p)];
                    let aiq = a[(i, q)];
                    a[(i, p)] = c * aip - s * aiq;
                    a[(i, q)] = s * aip + c * aiq;
                }
                for j in 0..d {
                    let apj = a[(p, j)];
                    let aqj = a[(q, j)];
                    a[(p, j)] = c * apj - s * aqj;
                    a[(q, j)] = s * apj + c * aqj;
                }
                for i in 0..d {
                    let vip = v[(i, p)];
                    let viq = v[(i, q)];
                    v[(i, p)] = c * vip - s * viq;
                    v[(i, q)] = s * vip + c * viq;
                }
            }
        }
    }

    let eigenvalues: Vec<f64> = (0..d).map(|i| a[(i, i)]).collect();
    (eigenvalues, v)
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}
