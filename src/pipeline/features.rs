//! Feature engineering: multi-hot slot encodings, ratio-based imputation and
//! one-hot encoding with explicit missing/other buckets.

use std::collections::HashMap;

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::config::{CodeMap, Settings};
use crate::utils::{print_count, print_info, print_step_header, print_success};

/// Number of fixed slot columns per multi-hot prefix (`{prefix}1..{prefix}5`).
const MULTI_HOT_SLOTS: usize = 5;

/// Sentinel code treated as missing during one-hot encoding.
const ONE_HOT_MISSING_SENTINEL: i64 = -1;

/// Build multi-hot indicator columns from a group of fixed slot columns.
///
/// For every label in the code map, a boolean `{prefix}{label}` column is
/// created that is true when any of the five slots holds one of the label's
/// codes. Codes may repeat across labels, so a row can be true for several
/// labels at once. Returns the names of the created columns.
pub fn generate_multi_hot_features(
    df: &mut DataFrame,
    prefix: &str,
    code_map: &CodeMap,
) -> Result<Vec<String>> {
    let mut slots: Vec<Vec<Option<i64>>> = Vec::new();
    for i in 1..=MULTI_HOT_SLOTS {
        let name = format!("{prefix}{i}");
        let Ok(col) = df.column(&name) else {
            continue;
        };
        let values: Vec<Option<i64>> = col.cast(&DataType::Int64)?.i64()?.into_iter().collect();
        slots.push(values);
    }
    if slots.is_empty() {
        anyhow::bail!("No slot columns found for multi-hot prefix '{}'", prefix);
    }

    let height = df.height();
    let mut created = Vec::new();
    for (label, codes) in code_map {
        let mask: Vec<bool> = (0..height)
            .map(|row| {
                slots.iter().any(|slot| {
                    slot[row].is_some_and(|code| codes.contains(&code))
                })
            })
            .collect();
        let name = format!("{prefix}{label}");
        df.with_column(Column::new(name.as_str().into(), mask))?;
        created.push(name);
    }
    Ok(created)
}

/// Drop the raw slot columns once their multi-hot encodings exist.
pub fn drop_multi_hot_slots(df: &mut DataFrame, prefix: &str) {
    let slots: Vec<String> = (1..=MULTI_HOT_SLOTS)
        .map(|i| format!("{prefix}{i}"))
        .filter(|name| df.column(name).is_ok())
        .collect();
    if !slots.is_empty() {
        *df = df.drop_many(slots);
    }
}

/// Impute missing income from the loan-type median of income/loan_amount.
///
/// The median ratio is computed per loan type over rows where both operands
/// are present and loan_amount is nonzero. Rows missing income but carrying
/// a loan_amount get `income = loan_amount * median_ratio`. Loan types with
/// no valid ratio observations leave their rows unimputed. Returns the
/// number of imputed rows.
pub fn impute_income(df: &mut DataFrame) -> Result<usize> {
    impute_by_loan_type_ratio(df, "income", "loan_amount", RatioDirection::NumeratorMissing)
}

/// Impute missing property value from the loan-type median of
/// loan_amount/property_value: `property_value = loan_amount / median_ratio`.
pub fn impute_property_value(df: &mut DataFrame) -> Result<usize> {
    impute_by_loan_type_ratio(
        df,
        "property_value",
        "loan_amount",
        RatioDirection::DenominatorMissing,
    )
}

enum RatioDirection {
    /// Ratio is target/other; impute `target = other * median`.
    NumeratorMissing,
    /// Ratio is other/target; impute `target = other / median`.
    DenominatorMissing,
}

fn impute_by_loan_type_ratio(
    df: &mut DataFrame,
    target_col: &str,
    other_col: &str,
    direction: RatioDirection,
) -> Result<usize> {
    let loan_types: Vec<Option<i64>> = df
        .column("loan_type")
        .context("loan_type column is required for ratio imputation")?
        .cast(&DataType::Int64)?
        .i64()?
        .into_iter()
        .collect();
    let targets: Vec<Option<f64>> = df
        .column(target_col)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .collect();
    let others: Vec<Option<f64>> = df
        .column(other_col)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .collect();

    // Median ratio per loan type, over rows where the ratio is defined.
    let mut ratios: HashMap<i64, Vec<f64>> = HashMap::new();
    for ((loan_type, target), other) in loan_types.iter().zip(&targets).zip(&others) {
        if let (Some(lt), Some(t), Some(o)) = (loan_type, target, other) {
            let ratio = match direction {
                RatioDirection::NumeratorMissing if *o != 0.0 => Some(t / o),
                RatioDirection::DenominatorMissing if *t != 0.0 => Some(o / t),
                _ => None,
            };
            if let Some(r) = ratio.filter(|r| r.is_finite()) {
                ratios.entry(*lt).or_default().push(r);
            }
        }
    }
    let medians: HashMap<i64, f64> = ratios
        .into_iter()
        .filter_map(|(lt, mut values)| {
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            crate::utils::stats::quantile_sorted(&values, 0.5).map(|m| (lt, m))
        })
        .collect();

    let mut imputed = 0usize;
    let filled: Vec<Option<f64>> = loan_types
        .iter()
        .zip(&targets)
        .zip(&others)
        .map(|((loan_type, target), other)| match (loan_type, target, other) {
            (Some(lt), None, Some(o)) => match medians.get(lt) {
                Some(median) => {
                    imputed += 1;
                    Some(match direction {
                        RatioDirection::NumeratorMissing => o * median,
                        RatioDirection::DenominatorMissing => o / median,
                    })
                }
                // No valid ratio observations for this loan type.
                None => None,
            },
            _ => *target,
        })
        .collect();

    df.with_column(Column::new(target_col.into(), filled))?;
    Ok(imputed)
}

/// One-hot encode the configured base columns.
///
/// Each base column becomes a `{col}_missing` indicator (null or the -1
/// sentinel), one indicator per configured label (value in the label's code
/// set and not missing), and a `{col}_other` bucket (non-missing, unmatched
/// by any label). The original column is dropped. For non-overlapping code
/// maps, exactly one non-missing indicator is true per row; overlap is
/// permitted by the map format and is the caller's concern.
pub fn one_hot_encode_columns(
    df: &mut DataFrame,
    maps: &std::collections::BTreeMap<String, CodeMap>,
) -> Result<Vec<String>> {
    let mut created = Vec::new();

    for (base, code_map) in maps {
        let Ok(col) = df.column(base).map(Column::clone) else {
            continue;
        };
        let values: Vec<Option<i64>> = col.cast(&DataType::Int64)?.i64()?.into_iter().collect();

        let missing: Vec<bool> = values
            .iter()
            .map(|v| match v {
                None => true,
                Some(code) => *code == ONE_HOT_MISSING_SENTINEL,
            })
            .collect();
        let mut any_matched = vec![false; values.len()];

        let mut indicator_cols: Vec<(String, Vec<bool>)> = Vec::new();
        for (label, codes) in code_map {
            let mask: Vec<bool> = values
                .iter()
                .zip(&missing)
                .map(|(v, &is_missing)| {
                    !is_missing && v.is_some_and(|code| codes.contains(&code))
                })
                .collect();
            for (acc, &m) in any_matched.iter_mut().zip(&mask) {
                *acc |= m;
            }
            indicator_cols.push((format!("{base}_{label}"), mask));
        }

        let other: Vec<bool> = missing
            .iter()
            .zip(&any_matched)
            .map(|(&is_missing, &matched)| !is_missing && !matched)
            .collect();

        df.with_column(Column::new(format!("{base}_missing").as_str().into(), missing))?;
        created.push(format!("{base}_missing"));
        for (name, mask) in indicator_cols {
            df.with_column(Column::new(name.as_str().into(), mask))?;
            created.push(name);
        }
        df.with_column(Column::new(format!("{base}_other").as_str().into(), other))?;
        created.push(format!("{base}_other"));

        *df = df.drop_many([base.as_str()]);
    }

    Ok(created)
}

/// Run the full feature-engineering stage over the cleaned table.
///
/// Consumes the cleaned table and returns the modeling table: multi-hot and
/// one-hot indicators built, income/property value imputed, raw slot and
/// label-source columns dropped.
pub fn run_feature_engineering(settings: &Settings, df: DataFrame) -> Result<DataFrame> {
    let mut df = df;

    print_step_header(1, "Multi-hot slot encodings");
    for (prefix, code_map) in &settings.features.multi_hot {
        let created = generate_multi_hot_features(&mut df, prefix, code_map)?;
        print_count(
            &format!("indicator(s) created for prefix '{}'", prefix),
            created.len(),
            None,
        );
        drop_multi_hot_slots(&mut df, prefix);
    }

    print_step_header(2, "Ratio-based imputation");
    let income_imputed = impute_income(&mut df)?;
    let property_imputed = impute_property_value(&mut df)?;
    print_count("income value(s) imputed", income_imputed, None);
    print_count("property value(s) imputed", property_imputed, None);

    print_step_header(3, "One-hot encoding");
    let created = one_hot_encode_columns(&mut df, &settings.features.one_hot)?;
    print_count("one-hot indicator column(s) created", created.len(), None);

    // action_taken is the label source; keeping it would leak the target.
    if df.column(super::clean::ACTION_TAKEN_COLUMN).is_ok() {
        df = df.drop_many([super::clean::ACTION_TAKEN_COLUMN]);
        print_info("Dropped action_taken (label source)");
    }

    print_success(&format!(
        "Modeling table: {} rows × {} columns",
        df.height(),
        df.width()
    ));
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn code_map(entries: &[(&str, &[i64])]) -> CodeMap {
        entries
            .iter()
            .map(|(label, codes)| (label.to_string(), codes.to_vec()))
            .collect()
    }

    #[test]
    fn test_multi_hot_any_slot_matches() {
        let mut df = df! {
            "race-1" => [Some(1i64), Some(5), None],
            "race-2" => [Some(2i64), None, None],
            "race-3" => [None::<i64>, None, None],
            "race-4" => [None::<i64>, None, None],
            "race-5" => [None::<i64>, None, Some(3)],
        }
        .unwrap();
        let map = code_map(&[("asian", &[2, 21]), ("black", &[3]), ("white", &[5])]);

        let created = generate_multi_hot_features(&mut df, "race-", &map).unwrap();
        assert_eq!(created.len(), 3);

        let asian: Vec<Option<bool>> = df
            .column("race-asian")
            .unwrap()
            .bool()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(asian, vec![Some(true), Some(false), Some(false)]);

        let white: Vec<Option<bool>> = df
            .column("race-white")
            .unwrap()
            .bool()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(white, vec![Some(false), Some(true), Some(false)]);
    }

    #[test]
    fn test_multi_hot_overlapping_codes_allowed() {
        let mut df = df! {
            "x-1" => [Some(7i64)],
            "x-2" => [None::<i64>],
            "x-3" => [None::<i64>],
            "x-4" => [None::<i64>],
            "x-5" => [None::<i64>],
        }
        .unwrap();
        // Code 7 appears under two labels; both indicators go true.
        let map = code_map(&[("first", &[7]), ("second", &[7, 8])]);

        generate_multi_hot_features(&mut df, "x-", &map).unwrap();

        assert_eq!(
            df.column("x-first").unwrap().bool().unwrap().get(0),
            Some(true)
        );
        assert_eq!(
            df.column("x-second").unwrap().bool().unwrap().get(0),
            Some(true)
        );
    }

    #[test]
    fn test_impute_income_median_scenario() {
        // loan_type 1 has observed ratios [2.0, 4.0] -> median 3.0; the row
        // missing income with loan_amount 100 gets 300.
        let mut df = df! {
            "loan_type" => [1i64, 1, 1, 2],
            "loan_amount" => [Some(100.0f64), Some(100.0), Some(100.0), Some(50.0)],
            "income" => [Some(200.0f64), Some(400.0), None, None],
        }
        .unwrap();

        let imputed = impute_income(&mut df).unwrap();
        assert_eq!(imputed, 1);

        let income: Vec<Option<f64>> = df
            .column("income")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(income[2], Some(300.0));
        // loan_type 2 has no ratio observations; row stays unimputed.
        assert_eq!(income[3], None);
    }

    #[test]
    fn test_impute_property_value_inverts_ratio() {
        // loan_amount/property_value ratios for type 1: [0.5, 0.5] -> median
        // 0.5; missing property value with loan_amount 100 becomes 200.
        let mut df = df! {
            "loan_type" => [1i64, 1, 1],
            "loan_amount" => [Some(100.0f64), Some(200.0), Some(100.0)],
            "property_value" => [Some(200.0f64), Some(400.0), None],
        }
        .unwrap();

        let imputed = impute_property_value(&mut df).unwrap();
        assert_eq!(imputed, 1);

        let values: Vec<Option<f64>> = df
            .column("property_value")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values[2], Some(200.0));
    }

    #[test]
    fn test_one_hot_exactly_one_indicator() {
        let mut df = df! {
            "loan_type" => [Some(1i64), Some(2), Some(9), Some(-1), None],
        }
        .unwrap();
        let mut maps = BTreeMap::new();
        maps.insert(
            "loan_type".to_string(),
            code_map(&[("conventional", &[1]), ("fha", &[2])]),
        );

        let created = one_hot_encode_columns(&mut df, &maps).unwrap();
        assert_eq!(
            created,
            vec![
                "loan_type_missing".to_string(),
                "loan_type_conventional".to_string(),
                "loan_type_fha".to_string(),
                "loan_type_other".to_string(),
            ]
        );
        assert!(df.column("loan_type").is_err(), "original column dropped");

        let get_col = |name: &str| -> Vec<bool> {
            df.column(name)
                .unwrap()
                .bool()
                .unwrap()
                .into_iter()
                .map(|v| v.unwrap())
                .collect()
        };
        let missing = get_col("loan_type_missing");
        let conventional = get_col("loan_type_conventional");
        let fha = get_col("loan_type_fha");
        let other = get_col("loan_type_other");

        assert_eq!(missing, vec![false, false, false, true, true]);
        assert_eq!(conventional, vec![true, false, false, false, false]);
        assert_eq!(fha, vec![false, true, false, false, false]);
        assert_eq!(other, vec![false, false, true, false, false]);

        // Non-missing rows: exactly one of {labels, other} is true.
        for row in 0..3 {
            let true_count = [conventional[row], fha[row], other[row]]
                .iter()
                .filter(|&&b| b)
                .count();
            assert_eq!(true_count, 1, "row {} should have exactly one indicator", row);
        }
    }
}
