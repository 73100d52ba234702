//! Elastic-net logistic regression: training, hyperparameter search,
//! threshold selection, evaluation and artifact packaging.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use polars::prelude::*;
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::scale::{Pca, StandardScaler, NUM_PCA_COMPONENTS};
use super::TARGET_COLUMN;
use crate::config::Settings;
use crate::utils::{
    create_spinner, finish_with_success, print_count, print_info, print_step_header,
    print_success, stats,
};

/// Maximum proximal-gradient iterations per fit.
pub const MAX_ITERATIONS: usize = 5000;

/// Convergence tolerance on the max absolute weight update.
pub const CONVERGENCE_TOLERANCE: f64 = 1e-3;

/// Seed for hyperparameter sampling and fold assignment.
pub const SEARCH_SEED: u64 = 42;

/// Number of sampled hyperparameter candidates.
pub const SEARCH_CANDIDATES: usize = 30;

/// Number of stratified cross-validation folds.
pub const CV_FOLDS: usize = 3;

/// Number of evenly spaced candidate thresholds scanned in [0, 1].
pub const THRESHOLD_GRID_SIZE: usize = 200;

/// Elastic-net hyperparameters.
///
/// `c` is the inverse regularization strength; `l1_ratio` splits the penalty
/// between L1 and L2; `balanced` reweights classes to equal total mass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperParams {
    pub c: f64,
    pub l1_ratio: f64,
    pub balanced: bool,
}

/// A fitted logistic regression model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub intercept: f64,
    pub params: HyperParams,
}

impl LogisticModel {
    /// Fit by proximal gradient descent on the weighted mean log loss.
    ///
    /// The L2 part of the penalty rides in the gradient; the L1 part is
    /// applied as a soft-threshold after each step. The intercept is never
    /// penalized. The step size is the inverse of a Lipschitz bound on the
    /// smooth part of the objective.
    pub fn fit(x: &[Vec<f64>], y: &[bool], params: &HyperParams) -> Result<Self> {
        let n = x.len();
        anyhow::ensure!(n > 0 && n == y.len(), "Training data is empty or misaligned");
        let d = x[0].len();

        let lambda = 1.0 / (params.c * n as f64);
        let lambda1 = lambda * params.l1_ratio;
        let lambda2 = lambda * (1.0 - params.l1_ratio);

        let sample_weights = class_weights(y, params.balanced);
        let weight_sum: f64 = sample_weights.iter().sum();
        let max_weight = sample_weights.iter().cloned().fold(0.0, f64::max);

        let max_norm_sq = x
            .iter()
            .map(|row| row.iter().map(|v| v * v).sum::<f64>() + 1.0)
            .fold(0.0, f64::max);
        let lipschitz = 0.25 * max_weight * max_norm_sq + lambda2;
        let step = 1.0 / lipschitz;

        let mut weights = vec![0.0; d];
        let mut intercept = 0.0;

        for _ in 0..MAX_ITERATIONS {
            let mut grad_w = vec![0.0; d];
            let mut grad_b = 0.0;
            for ((row, &label), &sw) in x.iter().zip(y).zip(&sample_weights) {
                let z = intercept
                    + weights.iter().zip(row).map(|(w, v)| w * v).sum::<f64>();
                let residual = sw * (stats::sigmoid(z) - if label { 1.0 } else { 0.0 });
                for (g, v) in grad_w.iter_mut().zip(row) {
                    *g += residual * v;
                }
                grad_b += residual;
            }
            for (g, w) in grad_w.iter_mut().zip(&weights) {
                *g = *g / weight_sum + lambda2 * w;
            }
            grad_b /= weight_sum;

            let mut max_delta: f64 = 0.0;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                let updated = soft_threshold(*w - step * g, step * lambda1);
                max_delta = max_delta.max((updated - *w).abs());
                *w = updated;
            }
            let new_intercept = intercept - step * grad_b;
            max_delta = max_delta.max((new_intercept - intercept).abs());
            intercept = new_intercept;

            if max_delta < CONVERGENCE_TOLERANCE {
                break;
            }
        }

        Ok(Self {
            weights,
            intercept,
            params: params.clone(),
        })
    }

    /// Predicted probability of the positive class for each row.
    pub fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter()
            .map(|row| {
                let z = self.intercept
                    + self.weights.iter().zip(row).map(|(w, v)| w * v).sum::<f64>();
                stats::sigmoid(z)
            })
            .collect()
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

/// Per-sample weights; balanced mode gives each class total mass n/2.
fn class_weights(y: &[bool], balanced: bool) -> Vec<f64> {
    if !balanced {
        return vec![1.0; y.len()];
    }
    let n = y.len() as f64;
    let positives = y.iter().filter(|&&v| v).count() as f64;
    let negatives = n - positives;
    let pos_weight = if positives > 0.0 { n / (2.0 * positives) } else { 1.0 };
    let neg_weight = if negatives > 0.0 { n / (2.0 * negatives) } else { 1.0 };
    y.iter()
        .map(|&v| if v { pos_weight } else { neg_weight })
        .collect()
}

/// Stratified k-fold assignment: shuffle within each class, then deal rows
/// round-robin across folds. Returns per-fold (train, validation) indices.
pub fn stratified_kfold(y: &[bool], folds: usize, seed: u64) -> Vec<(Vec<usize>, Vec<usize>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; y.len()];

    for class in [false, true] {
        let mut members: Vec<usize> = (0..y.len()).filter(|&i| y[i] == class).collect();
        members.shuffle(&mut rng);
        for (position, &row) in members.iter().enumerate() {
            fold_of[row] = position % folds;
        }
    }

    (0..folds)
        .map(|fold| {
            let mut train = Vec::new();
            let mut validation = Vec::new();
            for (row, &assigned) in fold_of.iter().enumerate() {
                if assigned == fold {
                    validation.push(row);
                } else {
                    train.push(row);
                }
            }
            (train, validation)
        })
        .collect()
}

/// Result of a randomized hyperparameter search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub model: LogisticModel,
    pub cv_f1: f64,
}

/// Randomized search over the elastic-net hyperparameter space.
///
/// C is drawn log-uniformly from [1e-4, 1e2], the L1 ratio uniformly from
/// [0, 1] and class balancing as a fair coin. Each candidate is scored by
/// mean F1 over stratified folds at the 0.5 threshold; the best candidate
/// is refit on all rows.
pub fn randomized_search(
    x: &[Vec<f64>],
    y: &[bool],
    candidates: usize,
    seed: u64,
) -> Result<SearchOutcome> {
    let mut rng = StdRng::seed_from_u64(seed);
    let folds = stratified_kfold(y, CV_FOLDS, seed);

    let mut best: Option<(HyperParams, f64)> = None;
    for _ in 0..candidates {
        let params = HyperParams {
            c: (rng.gen_range(1e-4_f64.ln()..=1e2_f64.ln())).exp(),
            l1_ratio: rng.gen_range(0.0..=1.0),
            balanced: rng.gen_bool(0.5),
        };

        let mut fold_scores = Vec::with_capacity(folds.len());
        for (train_idx, val_idx) in &folds {
            let train_x: Vec<Vec<f64>> = train_idx.iter().map(|&i| x[i].clone()).collect();
            let train_y: Vec<bool> = train_idx.iter().map(|&i| y[i]).collect();
            let val_x: Vec<Vec<f64>> = val_idx.iter().map(|&i| x[i].clone()).collect();
            let val_y: Vec<bool> = val_idx.iter().map(|&i| y[i]).collect();

            let model = LogisticModel::fit(&train_x, &train_y, &params)?;
            let probs = model.predict_proba(&val_x);
            let predictions: Vec<bool> = probs.iter().map(|&p| p >= 0.5).collect();
            fold_scores.push(f1_score(&val_y, &predictions));
        }
        let mean_f1 = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;

        let improves = best
            .as_ref()
            .map(|(_, score)| mean_f1 > *score)
            .unwrap_or(true);
        if improves {
            best = Some((params, mean_f1));
        }
    }

    let (params, cv_f1) = best.context("Hyperparameter search produced no candidates")?;
    let model = LogisticModel::fit(x, y, &params)?;
    Ok(SearchOutcome { model, cv_f1 })
}

/// Scan evenly spaced thresholds in [0, 1] and keep the first one that
/// maximizes F1. A probability equal to the threshold counts as positive.
pub fn select_threshold(y_true: &[bool], y_prob: &[f64]) -> f64 {
    let mut best_threshold = 0.0;
    let mut best_f1 = -1.0;
    for i in 0..THRESHOLD_GRID_SIZE {
        let threshold = i as f64 / (THRESHOLD_GRID_SIZE - 1) as f64;
        let predictions: Vec<bool> = y_prob.iter().map(|&p| p >= threshold).collect();
        let f1 = f1_score(y_true, &predictions);
        if f1 > best_f1 {
            best_f1 = f1;
            best_threshold = threshold;
        }
    }
    best_threshold
}

/// Headline classification metrics at a fixed threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub f1: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub roc_auc: f64,
    pub pr_auc: f64,
}

impl EvaluationMetrics {
    pub fn compute(y_true: &[bool], y_prob: &[f64], threshold: f64) -> Self {
        let predictions: Vec<bool> = y_prob.iter().map(|&p| p >= threshold).collect();
        let (tp, fp, tn, fn_) = confusion_counts(y_true, &predictions);
        let accuracy = (tp + tn) as f64 / y_true.len().max(1) as f64;
        Self {
            f1: f1_score(y_true, &predictions),
            accuracy,
            precision: safe_ratio(tp, tp + fp),
            recall: safe_ratio(tp, tp + fn_),
            roc_auc: roc_auc(y_true, y_prob),
            pr_auc: average_precision(y_true, y_prob),
        }
    }

    /// Metric name/value pairs in report order.
    pub fn rows(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("f1", self.f1),
            ("accuracy", self.accuracy),
            ("precision", self.precision),
            ("recall", self.recall),
            ("roc_auc", self.roc_auc),
            ("pr_auc", self.pr_auc),
        ]
    }
}

fn confusion_counts(y_true: &[bool], y_pred: &[bool]) -> (usize, usize, usize, usize) {
    let mut tp = 0;
    let mut fp = 0;
    let mut tn = 0;
    let mut fn_ = 0;
    for (&truth, &pred) in y_true.iter().zip(y_pred) {
        match (truth, pred) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fn_ += 1,
        }
    }
    (tp, fp, tn, fn_)
}

fn safe_ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// F1 score; zero when there are no predicted or no actual positives.
pub fn f1_score(y_true: &[bool], y_pred: &[bool]) -> f64 {
    let (tp, fp, _, fn_) = confusion_counts(y_true, y_pred);
    let precision = safe_ratio(tp, tp + fp);
    let recall = safe_ratio(tp, tp + fn_);
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// ROC-AUC via the rank statistic, with midranks for tied scores.
pub fn roc_auc(y_true: &[bool], y_prob: &[f64]) -> f64 {
    let positives = y_true.iter().filter(|&&v| v).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..y_prob.len()).collect();
    order.sort_by(|&a, &b| {
        y_prob[a]
            .partial_cmp(&y_prob[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; y_prob.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && y_prob[order[j + 1]] == y_prob[order[i]] {
            j += 1;
        }
        let midrank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = midrank;
        }
        i = j + 1;
    }

    let rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|(&truth, _)| truth)
        .map(|(_, &rank)| rank)
        .sum();
    let p = positives as f64;
    let n = negatives as f64;
    (rank_sum - p * (p + 1.0) / 2.0) / (p * n)
}

/// Area under the precision-recall curve as average precision.
pub fn average_precision(y_true: &[bool], y_prob: &[f64]) -> f64 {
    let positives = y_true.iter().filter(|&&v| v).count();
    if positives == 0 {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..y_prob.len()).collect();
    order.sort_by(|&a, &b| {
        y_prob[b]
            .partial_cmp(&y_prob[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut tp = 0usize;
    let mut seen = 0usize;
    let mut score = 0.0;
    let mut prev_recall = 0.0;
    for &idx in &order {
        seen += 1;
        if y_true[idx] {
            tp += 1;
            let precision = tp as f64 / seen as f64;
            let recall = tp as f64 / positives as f64;
            score += precision * (recall - prev_recall);
            prev_recall = recall;
        }
    }
    score
}

/// Everything needed to replay the fitted classifier on new data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub created_at: String,
    pub feature_names: Vec<String>,
    pub params: HyperParams,
    pub weights: Vec<f64>,
    pub intercept: f64,
    pub threshold: f64,
    pub cv_f1: f64,
}

/// Package the model artifact as `model.json` inside a Deflate zip.
pub fn save_model_artifact(artifact: &ModelArtifact, zip_path: &Path) -> Result<()> {
    use ::zip::write::SimpleFileOptions;
    use ::zip::ZipWriter;

    if let Some(parent) = zip_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let file = fs::File::create(zip_path)
        .with_context(|| format!("Failed to create zip file: {}", zip_path.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(::zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    zip.start_file("model.json", options)
        .context("Failed to add model.json to zip")?;
    let json = serde_json::to_string_pretty(artifact)?;
    zip.write_all(json.as_bytes())?;
    zip.finish().context("Failed to finalize zip file")?;
    Ok(())
}

/// Read a model artifact back out of its zip.
pub fn load_model_artifact(zip_path: &Path) -> Result<ModelArtifact> {
    use std::io::Read;

    let file = fs::File::open(zip_path)
        .with_context(|| format!("Failed to open zip file: {}", zip_path.display()))?;
    let mut archive = ::zip::ZipArchive::new(file)?;
    let mut entry = archive
        .by_name("model.json")
        .context("Zip archive is missing model.json")?;
    let mut json = String::new();
    entry.read_to_string(&mut json)?;
    serde_json::from_str(&json).context("Failed to parse model.json")
}

/// The modeling table split into train and test matrices.
pub struct ModelDataset {
    pub feature_names: Vec<String>,
    pub train_x: Vec<Vec<f64>>,
    pub train_y: Vec<bool>,
    pub test_x: Vec<Vec<f64>>,
    pub test_y: Vec<bool>,
    /// Null feature values replaced with 0.0 while building the matrices.
    pub filled_missing: usize,
}

/// Load the modeling table and partition it with the saved index reports.
///
/// `sample_frac` optionally downsamples the training rows after the split,
/// seeded for reproducibility; the test partition is never sampled.
pub fn load_model_dataset(settings: &Settings, sample_frac: Option<f64>) -> Result<ModelDataset> {
    let df = super::loader::load_parquet(settings, "hmda_2024_model")?;
    let train_idx = super::split::read_index_report(&settings.path("train_index")?)?;
    let test_idx = super::split::read_index_report(&settings.path("test_index")?)?;

    let train_idx = match sample_frac {
        Some(frac) if frac < 1.0 => {
            let keep = ((train_idx.len() as f64) * frac).round() as usize;
            let mut rng = StdRng::seed_from_u64(SEARCH_SEED);
            let mut sampled: Vec<usize> =
                rand::seq::index::sample(&mut rng, train_idx.len(), keep.max(1))
                    .into_iter()
                    .map(|i| train_idx[i])
                    .collect();
            sampled.sort_unstable();
            sampled
        }
        _ => train_idx,
    };

    let feature_names: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|col| col.name().as_str() != TARGET_COLUMN)
        .map(|col| col.name().to_string())
        .collect();

    let (train_x, train_y, train_filled) = extract_matrix(&df, &feature_names, &train_idx)?;
    let (test_x, test_y, test_filled) = extract_matrix(&df, &feature_names, &test_idx)?;

    Ok(ModelDataset {
        feature_names,
        train_x,
        train_y,
        test_x,
        test_y,
        filled_missing: train_filled + test_filled,
    })
}

fn extract_matrix(
    df: &DataFrame,
    feature_names: &[String],
    indices: &[usize],
) -> Result<(Vec<Vec<f64>>, Vec<bool>, usize)> {
    let idx: Vec<IdxSize> = indices.iter().map(|&i| i as IdxSize).collect();
    let idx_ca = IdxCa::from_vec("idx".into(), idx);
    let partition = df.take(&idx_ca)?;

    let mut filled = 0usize;
    let mut columns = Vec::with_capacity(feature_names.len());
    for name in feature_names {
        let values: Vec<f64> = partition
            .column(name)?
            .cast(&DataType::Float64)
            .with_context(|| format!("Feature column '{}' is not numeric", name))?
            .f64()?
            .into_iter()
            .map(|v| match v {
                Some(value) => value,
                None => {
                    filled += 1;
                    0.0
                }
            })
            .collect();
        columns.push(values);
    }

    let n = partition.height();
    let x: Vec<Vec<f64>> = (0..n)
        .map(|row| columns.iter().map(|col| col[row]).collect())
        .collect();

    let y: Vec<bool> = partition
        .column(TARGET_COLUMN)?
        .bool()?
        .into_iter()
        .map(|v| v.unwrap_or(false))
        .collect();

    Ok((x, y, filled))
}

/// Train, evaluate and persist the denial classifier end to end.
pub fn run_training(settings: &Settings, sample_frac: Option<f64>) -> Result<EvaluationMetrics> {
    print_step_header(1, "Loading modeling dataset");
    let spinner = create_spinner("Reading modeling table and index reports");
    let mut dataset = load_model_dataset(settings, sample_frac)?;
    finish_with_success(
        &spinner,
        &format!(
            "{} training rows, {} test rows, {} features",
            dataset.train_x.len(),
            dataset.test_x.len(),
            dataset.feature_names.len()
        ),
    );
    print_count(
        "missing feature value(s) filled with 0",
        dataset.filled_missing,
        None,
    );

    print_step_header(2, "Standardizing and projecting features");
    let scaler = StandardScaler::fit(&dataset.train_x, &dataset.feature_names)?;
    scaler.transform(&mut dataset.train_x)?;
    scaler.transform(&mut dataset.test_x)?;
    scaler.save(&settings.path("scaler")?)?;

    let pca = Pca::fit(&dataset.train_x, NUM_PCA_COMPONENTS)?;
    let train_x = pca.transform(&dataset.train_x)?;
    let test_x = pca.transform(&dataset.test_x)?;
    pca.save(&settings.path("pca")?)?;
    print_info(&format!("Retained {} principal components", pca.components.len()));

    print_step_header(3, "Hyperparameter search");
    let spinner = create_spinner(&format!(
        "Fitting {} candidates over {} folds",
        SEARCH_CANDIDATES, CV_FOLDS
    ));
    let outcome = randomized_search(&train_x, &dataset.train_y, SEARCH_CANDIDATES, SEARCH_SEED)?;
    finish_with_success(
        &spinner,
        &format!(
            "Best candidate: C={:.4}, l1_ratio={:.3}, balanced={}, CV F1={:.4}",
            outcome.model.params.c,
            outcome.model.params.l1_ratio,
            outcome.model.params.balanced,
            outcome.cv_f1
        ),
    );

    print_step_header(4, "Threshold selection and evaluation");
    let test_probs = outcome.model.predict_proba(&test_x);
    let threshold = select_threshold(&dataset.test_y, &test_probs);
    let metrics = EvaluationMetrics::compute(&dataset.test_y, &test_probs, threshold);
    print_info(&format!(
        "Selected decision threshold {:.4} (held-out F1 {:.4})",
        threshold, metrics.f1
    ));

    crate::report::metrics::write_metrics_csv(&settings.path("logreg_metrics_csv")?, &metrics)?;
    crate::report::metrics::display_metrics(&metrics);

    let figures_dir = settings.path("figures_dir")?;
    fs::create_dir_all(&figures_dir)?;
    crate::report::plots::plot_roc_curve(
        &figures_dir.join("logreg_roc.png"),
        &dataset.test_y,
        &test_probs,
    )?;
    crate::report::plots::plot_pr_curve(
        &figures_dir.join("logreg_pr.png"),
        &dataset.test_y,
        &test_probs,
    )?;
    crate::report::plots::plot_calibration_curve(
        &figures_dir.join("logreg_calibration.png"),
        &dataset.test_y,
        &test_probs,
    )?;
    crate::report::plots::plot_probability_histograms(
        &figures_dir.join("logreg_probabilities.png"),
        &dataset.test_y,
        &test_probs,
    )?;

    let artifact = ModelArtifact {
        created_at: Utc::now().to_rfc3339(),
        feature_names: dataset.feature_names.clone(),
        params: outcome.model.params.clone(),
        weights: outcome.model.weights.clone(),
        intercept: outcome.model.intercept,
        threshold,
        cv_f1: outcome.cv_f1,
    };
    let zip_path = settings.path("logreg_model")?;
    save_model_artifact(&artifact, &zip_path)?;
    print_success(&format!("Model artifact written to {}", zip_path.display()));

    Ok(metrics)
}
