//! End-to-end tests for the training stage

use hmda_pipeline::pipeline::{
    load_model_artifact, run_training, write_index_report, TARGET_COLUMN,
};
use hmda_pipeline::report::load_model_metrics;
use polars::prelude::*;

#[path = "common/mod.rs"]
mod common;

/// Separable two-feature modeling table: positives cluster high, negatives
/// low, with alternating rows so both partitions carry both classes.
fn write_model_fixture(settings: &hmda_pipeline::config::Settings) {
    let n = 160;
    let mut f1 = Vec::with_capacity(n);
    let mut f2 = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let positive = i % 2 == 0;
        let jitter = (i % 7) as f64 * 0.05;
        if positive {
            f1.push(2.0 + jitter);
            f2.push(1.5 - jitter);
        } else {
            f1.push(-2.0 - jitter);
            f2.push(-1.5 + jitter);
        }
        labels.push(positive);
    }
    let mut df = df! {
        "pc_a" => f1,
        "pc_b" => f2,
        TARGET_COLUMN => labels,
    }
    .unwrap();
    common::write_parquet_fixture(settings, "hmda_2024_model", &mut df);

    // Last 40 rows held out; both partitions keep the alternating labels.
    let train: Vec<usize> = (0..120).collect();
    let test: Vec<usize> = (120..160).collect();
    write_index_report(&settings.path("train_index").unwrap(), &train).unwrap();
    write_index_report(&settings.path("test_index").unwrap(), &test).unwrap();
}

#[test]
fn test_run_training_writes_all_artifacts() {
    let (_dir, settings) = common::temp_project();
    write_model_fixture(&settings);

    let metrics = run_training(&settings, None).unwrap();

    // Perfectly separable data: the tuned model should classify the held-out
    // rows essentially perfectly.
    assert!(metrics.f1 > 0.95, "f1 was {}", metrics.f1);
    assert!(metrics.roc_auc > 0.95, "roc_auc was {}", metrics.roc_auc);

    assert!(settings.path("scaler").unwrap().exists());
    assert!(settings.path("pca").unwrap().exists());
    assert!(settings.path("logreg_model").unwrap().exists());
    assert!(settings.path("logreg_metrics_csv").unwrap().exists());

    let figures = settings.path("figures_dir").unwrap();
    for name in [
        "logreg_roc.png",
        "logreg_pr.png",
        "logreg_calibration.png",
        "logreg_probabilities.png",
    ] {
        assert!(figures.join(name).exists(), "missing figure {}", name);
    }
}

#[test]
fn test_run_training_metrics_csv_is_loadable() {
    let (_dir, settings) = common::temp_project();
    write_model_fixture(&settings);

    let metrics = run_training(&settings, None).unwrap();

    let rows = load_model_metrics(&settings.path("logreg_metrics_csv").unwrap()).unwrap();
    let f1_row = rows.iter().find(|(name, _)| name == "f1").unwrap();
    assert!((f1_row.1 - metrics.f1).abs() < 1e-12);
    assert_eq!(rows.len(), 6);
}

#[test]
fn test_run_training_artifact_round_trips() {
    let (_dir, settings) = common::temp_project();
    write_model_fixture(&settings);

    run_training(&settings, None).unwrap();

    let artifact = load_model_artifact(&settings.path("logreg_model").unwrap()).unwrap();
    assert_eq!(artifact.feature_names, vec!["pc_a", "pc_b"]);
    assert!(artifact.threshold >= 0.0 && artifact.threshold <= 1.0);
    assert!(!artifact.weights.is_empty());
    assert!(!artifact.created_at.is_empty());
}

#[test]
fn test_run_training_picks_threshold_on_held_out_rows() {
    let (_dir, settings) = common::temp_project();

    // The mid-band at pc_a = -1 is all positive in training but all negative
    // in the held-out partition. A threshold tuned on the training rows sits
    // below the mid-band probability and misclassifies every held-out
    // mid-band row; a threshold tuned on the held-out rows separates them.
    let n = 160;
    let mut f1 = Vec::with_capacity(n);
    let mut f2 = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let jitter = (i % 7) as f64 * 0.01;
        let (x, positive) = if i < 120 {
            match i % 4 {
                0 | 1 => (-2.0 - jitter, false),
                2 => (2.0 + jitter, true),
                _ => (-1.0 + jitter, true),
            }
        } else {
            match i % 4 {
                0 => (-2.0 - jitter, false),
                1 => (-1.0 + jitter, false),
                _ => (2.0 + jitter, true),
            }
        };
        f1.push(x);
        f2.push(0.5 * x);
        labels.push(positive);
    }
    let mut df = df! {
        "pc_a" => f1,
        "pc_b" => f2,
        TARGET_COLUMN => labels,
    }
    .unwrap();
    common::write_parquet_fixture(&settings, "hmda_2024_model", &mut df);

    let train: Vec<usize> = (0..120).collect();
    let test: Vec<usize> = (120..160).collect();
    write_index_report(&settings.path("train_index").unwrap(), &train).unwrap();
    write_index_report(&settings.path("test_index").unwrap(), &test).unwrap();

    let metrics = run_training(&settings, None).unwrap();
    assert!(metrics.f1 > 0.99, "f1 was {}", metrics.f1);

    let artifact = load_model_artifact(&settings.path("logreg_model").unwrap()).unwrap();
    assert!(artifact.threshold > 0.0 && artifact.threshold < 1.0);
}

#[test]
fn test_run_training_with_sampling_still_evaluates_full_test_set() {
    let (_dir, settings) = common::temp_project();
    write_model_fixture(&settings);

    let metrics = run_training(&settings, Some(0.5)).unwrap();
    // Half the training rows is still plenty for this separation.
    assert!(metrics.accuracy > 0.9, "accuracy was {}", metrics.accuracy);
}
