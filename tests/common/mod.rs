//! Shared test utilities and fixture generators

use std::path::Path;

use hmda_pipeline::config::Settings;
use polars::prelude::*;
use tempfile::TempDir;

/// Write a full set of pipeline config documents under `root/configs` and
/// load them as [`Settings`].
pub fn setup_project(root: &Path) -> Settings {
    let configs = root.join("configs");
    std::fs::create_dir_all(&configs).unwrap();

    std::fs::write(
        configs.join("paths.yaml"),
        r#"hmda_2024_raw: data/raw/lar.txt
hmda_2024_interim: data/interim/lar.parquet
hmda_2024_clean: data/processed/clean.parquet
hmda_2024_features: data/processed/features.parquet
hmda_2024_model: data/processed/model.parquet
schema_summary: reports/schema_summary.csv
train_index: reports/train_index.csv
test_index: reports/test_index.csv
logreg_metrics_csv: reports/logreg_metrics.csv
logreg_model: models/logreg.zip
scaler: models/scaler.json
pca: models/pca.json
figures_dir: reports/figures
"#,
    )
    .unwrap();

    std::fs::write(
        configs.join("schema.yaml"),
        r#"columns:
  action_taken: {dtype: int64, type: numeric, role: keep}
  loan_type: {dtype: int64, type: categorical, role: keep}
  loan_amount: {dtype: float64, type: numeric, role: keep}
  income: {dtype: float64, type: numeric, role: keep}
  property_value: {dtype: float64, type: numeric, role: keep}
  combined_loan_to_value_ratio: {dtype: float64, type: numeric, role: keep}
  applicant_age: {dtype: category, type: categorical, role: keep}
  lei: {dtype: str, type: categorical, role: drop}
"#,
    )
    .unwrap();

    std::fs::write(
        configs.join("cleaning.yaml"),
        r#"cleaning:
  null_like: ["", "na", "n/a", "null", "none", "nan"]
  sample_frac: 1.0
  exempt_sentinels: ["exempt", "1111"]
  exempt_columns: [combined_loan_to_value_ratio]
  action_taken:
    approved: [1, 2, 8]
    denied: [3, 7]
"#,
    )
    .unwrap();

    std::fs::write(
        configs.join("feature_engineering.yaml"),
        r#"feature_engineering:
  multi_hot:
    "applicant_race-":
      white: [5]
      black: [3]
  one_hot:
    loan_type:
      conventional: [1]
      fha: [2]
"#,
    )
    .unwrap();

    std::fs::write(
        configs.join("eda.yaml"),
        "eda:\n  skew_threshold: 2.0\n  kurtosis_threshold: 7.0\n  outlier_threshold: 0.05\n",
    )
    .unwrap();

    Settings::from_root(root.to_path_buf()).unwrap()
}

/// A fresh temp project with configs in place.
pub fn temp_project() -> (TempDir, Settings) {
    let dir = TempDir::new().unwrap();
    let settings = setup_project(dir.path());
    (dir, settings)
}

/// An all-string table shaped like the converted raw extract.
pub fn create_interim_dataframe() -> DataFrame {
    df! {
        "lei" => ["BANK1", "BANK1", "BANK2", "BANK2", "BANK3", "BANK3"],
        "action_taken" => ["1", "3", "2", "7", "4", "3"],
        "loan_type" => ["1", "1", "2", "2", "1", "9"],
        "loan_amount" => ["100000", "250000", "175000", "90000", "60000", "not_a_number"],
        "income" => [Some("85"), Some("120"), None, Some("42"), Some("77"), Some("55")],
        "property_value" => ["300000", "500000", "350000", "150000", "200000", "180000"],
        "combined_loan_to_value_ratio" => ["80.5", "Exempt", "72.1", "1111", "65.0", "90.0"],
        "applicant_age" => ["25-34", "35-44", "45-54", "35-44", "25-34", "65-74"],
    }
    .unwrap()
}

/// A cleaned-style table carrying the derived denial label.
pub fn create_cleaned_dataframe() -> DataFrame {
    df! {
        "action_taken" => [1i64, 3, 2, 7, 3, 1, 1, 3],
        "denied_flag" => [false, true, false, true, true, false, false, true],
        "loan_type" => [1i64, 1, 2, 2, 1, 1, 2, 1],
        "loan_amount" => [100000.0f64, 250000.0, 175000.0, 90000.0, 60000.0, 300000.0, 120000.0, 80000.0],
        "income" => [Some(85.0f64), Some(120.0), None, Some(42.0), Some(77.0), Some(150.0), None, Some(30.0)],
        "property_value" => [Some(300000.0f64), Some(500000.0), Some(350000.0), None, Some(200000.0), Some(600000.0), Some(240000.0), Some(160000.0)],
        "combined_loan_to_value_ratio" => [Some(80.5f64), None, Some(72.1), None, Some(65.0), Some(90.0), Some(75.0), Some(85.0)],
        "applicant_race-1" => [Some(5i64), Some(3), Some(5), None, Some(5), Some(3), Some(5), Some(5)],
        "applicant_race-2" => [None::<i64>, Some(5), None, None, None, None, None, None],
        "applicant_age" => ["25-34", "35-44", "45-54", "35-44", "25-34", "65-74", "45-54", "25-34"],
    }
    .unwrap()
}

/// Write `df` as Parquet at the path registered under `key`.
pub fn write_parquet_fixture(settings: &Settings, key: &str, df: &mut DataFrame) {
    let path = settings.path(key).unwrap();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = std::fs::File::create(&path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();
}

/// Assert that a DataFrame contains specific columns.
pub fn assert_has_columns(df: &DataFrame, expected_cols: &[&str]) {
    let actual: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for col in expected_cols {
        assert!(
            actual.contains(&col.to_string()),
            "Missing expected column: '{}'. Actual columns: {:?}",
            col,
            actual
        );
    }
}

/// Assert that a DataFrame does NOT contain specific columns.
pub fn assert_missing_columns(df: &DataFrame, unexpected_cols: &[&str]) {
    let actual: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for col in unexpected_cols {
        assert!(
            !actual.contains(&col.to_string()),
            "Unexpected column still present: '{}'",
            col
        );
    }
}
