//! End-to-end tests for the feature-engineering stage

use hmda_pipeline::pipeline::run_feature_engineering;
use polars::prelude::*;

#[path = "common/mod.rs"]
mod common;

#[test]
fn test_feature_engineering_builds_multi_hot_indicators() {
    let (_dir, settings) = common::temp_project();
    let df = common::create_cleaned_dataframe();

    let features = run_feature_engineering(&settings, df).unwrap();

    common::assert_has_columns(&features, &["applicant_race-white", "applicant_race-black"]);
    common::assert_missing_columns(&features, &["applicant_race-1", "applicant_race-2"]);

    // Row 1 holds race codes 3 and 5 across two slots: both indicators true.
    let white: Vec<Option<bool>> = features
        .column("applicant_race-white")
        .unwrap()
        .bool()
        .unwrap()
        .into_iter()
        .collect();
    let black: Vec<Option<bool>> = features
        .column("applicant_race-black")
        .unwrap()
        .bool()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(white[1], Some(true));
    assert_eq!(black[1], Some(true));
    assert_eq!(white[0], Some(true));
    assert_eq!(black[0], Some(false));
    // Row 3 has no race codes at all.
    assert_eq!(white[3], Some(false));
    assert_eq!(black[3], Some(false));
}

#[test]
fn test_feature_engineering_one_hot_replaces_base_column() {
    let (_dir, settings) = common::temp_project();
    let df = common::create_cleaned_dataframe();

    let features = run_feature_engineering(&settings, df).unwrap();

    common::assert_has_columns(
        &features,
        &[
            "loan_type_missing",
            "loan_type_conventional",
            "loan_type_fha",
            "loan_type_other",
        ],
    );
    common::assert_missing_columns(&features, &["loan_type"]);

    // Every row carries exactly one of the non-missing indicators.
    let conventional = features.column("loan_type_conventional").unwrap().bool().unwrap();
    let fha = features.column("loan_type_fha").unwrap().bool().unwrap();
    let other = features.column("loan_type_other").unwrap().bool().unwrap();
    for row in 0..features.height() {
        let count = [conventional.get(row), fha.get(row), other.get(row)]
            .iter()
            .filter(|v| **v == Some(true))
            .count();
        assert_eq!(count, 1, "row {} has {} indicators set", row, count);
    }
}

#[test]
fn test_feature_engineering_imputes_missing_income() {
    let (_dir, settings) = common::temp_project();
    let df = common::create_cleaned_dataframe();
    let missing_before = df.column("income").unwrap().null_count();
    assert_eq!(missing_before, 2);

    let features = run_feature_engineering(&settings, df).unwrap();

    // Both missing incomes sit on rows with a loan amount and a loan type
    // that has observed income ratios, so both get imputed.
    assert_eq!(features.column("income").unwrap().null_count(), 0);
    let imputed = features.column("income").unwrap().f64().unwrap().get(2);
    assert!(imputed.unwrap() > 0.0);
}

#[test]
fn test_feature_engineering_drops_label_source() {
    let (_dir, settings) = common::temp_project();
    let df = common::create_cleaned_dataframe();

    let features = run_feature_engineering(&settings, df).unwrap();

    common::assert_missing_columns(&features, &["action_taken"]);
    common::assert_has_columns(&features, &["denied_flag"]);
}
