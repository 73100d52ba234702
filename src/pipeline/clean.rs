//! Cleaning stage: null-like token detection, exemption sentinel splitting,
//! schema-driven type coercion, and derivation of the denial target label.

use std::collections::HashSet;

use anyhow::{Context, Result};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{Dtype, Role, SchemaConfig, Settings};
use crate::pipeline::column_to_strings;
use crate::utils::{print_count, print_info, print_step_header, print_success, print_warning};

/// Column holding the raw HMDA action-taken code.
pub const ACTION_TAKEN_COLUMN: &str = "action_taken";

/// Seed for the null-like sampling pass, fixed for reproducible reports.
const NULL_LIKE_SAMPLE_SEED: u64 = 0;

/// A column where sampled values matched null-like tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct NullLikeHit {
    pub column: String,
    /// Fraction of sampled non-null values matching a null-like token.
    pub fraction: f64,
}

/// Outcome of coercing one column to its declared dtype.
#[derive(Debug, Clone)]
pub struct CoercionOutcome {
    pub column: String,
    pub dtype: Dtype,
    /// Values nulled by the coercion: nulls after minus nulls before.
    pub failures: i64,
}

/// Scan string columns for values that look like encoded nulls.
///
/// Tokens are matched case-insensitively after deduplication. Each column is
/// sampled at `sample_frac` with a fixed seed; the reported fraction is over
/// sampled non-null values. Columns with a zero hit fraction are omitted and
/// the result is sorted descending by fraction. An empty token list yields an
/// empty result.
pub fn null_like_check(
    df: &DataFrame,
    null_like: &[String],
    sample_frac: f64,
) -> Result<Vec<NullLikeHit>> {
    let tokens: HashSet<String> = null_like.iter().map(|t| t.to_lowercase()).collect();
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut rng = StdRng::seed_from_u64(NULL_LIKE_SAMPLE_SEED);
    let mut hits: Vec<NullLikeHit> = Vec::new();

    for col in df.get_columns() {
        if !matches!(col.dtype(), DataType::String) {
            continue;
        }
        let ca = col.str()?;
        let n = ca.len();
        if n == 0 {
            continue;
        }

        let sampled_rows: Vec<usize> = if sample_frac < 1.0 {
            let amount = ((n as f64) * sample_frac).round() as usize;
            if amount == 0 {
                continue;
            }
            rand::seq::index::sample(&mut rng, n, amount.min(n)).into_vec()
        } else {
            (0..n).collect()
        };

        let mut sampled_non_null = 0usize;
        let mut matched = 0usize;
        for &row in &sampled_rows {
            if let Some(value) = ca.get(row) {
                sampled_non_null += 1;
                if tokens.contains(&value.to_lowercase()) {
                    matched += 1;
                }
            }
        }

        if sampled_non_null > 0 && matched > 0 {
            hits.push(NullLikeHit {
                column: col.name().to_string(),
                fraction: matched as f64 / sampled_non_null as f64,
            });
        }
    }

    hits.sort_by(|a, b| {
        b.fraction
            .partial_cmp(&a.fraction)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(hits)
}

/// Split exemption sentinels out of the designated columns.
///
/// For each column, rows whose trimmed, case-folded value equals one of the
/// sentinels (e.g. "exempt", "1111") are flagged into a new `{col}_exempt`
/// boolean column and the original cell is nulled. Re-running is idempotent:
/// existing flags are preserved and already-blanked cells are not re-flagged.
///
/// Returns the names of the flag columns that were created or updated.
pub fn apply_exempt_split(
    df: &mut DataFrame,
    columns: &[String],
    sentinels: &[String],
) -> Result<Vec<String>> {
    let sentinels: HashSet<String> = sentinels
        .iter()
        .map(|s| s.trim().to_lowercase())
        .collect();

    let mut flag_columns = Vec::new();

    for name in columns {
        if df.column(name).is_err() {
            continue;
        }
        let flag_name = format!("{name}_exempt");
        let values = column_to_strings(df.column(name)?)?;

        let mask: Vec<bool> = values
            .iter()
            .map(|v| match v {
                Some(s) => sentinels.contains(&s.trim().to_lowercase()),
                None => false,
            })
            .collect();

        // Preserve flags from a previous run so the split stays idempotent.
        let flags: Vec<bool> = match df.column(&flag_name) {
            Ok(existing) => existing
                .bool()?
                .into_iter()
                .zip(mask.iter())
                .map(|(prev, &cur)| prev.unwrap_or(false) | cur)
                .collect(),
            Err(_) => mask.clone(),
        };

        let blanked: Vec<Option<String>> = values
            .into_iter()
            .zip(mask.iter())
            .map(|(v, &flagged)| if flagged { None } else { v })
            .collect();

        df.with_column(Column::new(name.as_str().into(), blanked))?;
        df.with_column(Column::new(flag_name.as_str().into(), flags))?;
        flag_columns.push(flag_name);
    }

    Ok(flag_columns)
}

/// Coerce every schema-declared, non-dropped column to its declared dtype.
///
/// Coercion failures become nulls and are counted as nulls-after minus
/// nulls-before; a nonzero count is reported, never raised. Columns that fail
/// to convert outright are reported and left unconverted.
pub fn convert_by_schema(df: &mut DataFrame, schema: &SchemaConfig) -> Result<Vec<CoercionOutcome>> {
    let mut outcomes = Vec::new();

    for (name, spec) in &schema.columns {
        if spec.role == Role::Drop {
            continue;
        }
        let (nulls_before, converted) = {
            let Ok(col) = df.column(name) else {
                continue;
            };
            let converted = match spec.dtype {
                Dtype::Float64 => col.cast(&DataType::Float64),
                Dtype::Int64 => col.cast(&DataType::Int64),
                Dtype::Boolean => convert_to_boolean(col),
                Dtype::Utf8 => col.cast(&DataType::String),
                Dtype::Categorical => col.cast(&DataType::Categorical(None, Default::default())),
            };
            (col.null_count() as i64, converted)
        };

        match converted {
            Ok(converted) => {
                let failures = converted.null_count() as i64 - nulls_before;
                if failures > 0 {
                    print_warning(&format!(
                        "{}: {} value(s) failed coercion to {}",
                        name, failures, spec.dtype
                    ));
                }
                df.with_column(converted)?;
                outcomes.push(CoercionOutcome {
                    column: name.clone(),
                    dtype: spec.dtype,
                    failures,
                });
            }
            Err(e) => {
                // Report and continue with the next column; this one keeps
                // its original representation.
                print_warning(&format!("{}: left unconverted ({})", name, e));
            }
        }
    }

    Ok(outcomes)
}

/// Boolean coercion accepting the string spellings seen in raw extracts.
fn convert_to_boolean(col: &Column) -> PolarsResult<Column> {
    if matches!(col.dtype(), DataType::Boolean) {
        return Ok(col.clone());
    }
    if matches!(col.dtype(), DataType::String) {
        let values: Vec<Option<bool>> = col
            .str()?
            .into_iter()
            .map(|v| {
                v.and_then(|s| match s.trim().to_lowercase().as_str() {
                    "true" | "t" | "1" | "yes" => Some(true),
                    "false" | "f" | "0" | "no" => Some(false),
                    _ => None,
                })
            })
            .collect();
        return Ok(Column::new(col.name().clone(), values));
    }
    col.cast(&DataType::Boolean)
}

/// Trim leading/trailing whitespace on every string column, in place.
pub fn strip_string_columns(df: &mut DataFrame) -> Result<()> {
    let string_cols: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|c| matches!(c.dtype(), DataType::String))
        .map(|c| c.name().to_string())
        .collect();

    for name in string_cols {
        let trimmed: Vec<Option<String>> = df
            .column(&name)?
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.trim().to_string()))
            .collect();
        df.with_column(Column::new(name.as_str().into(), trimmed))?;
    }
    Ok(())
}

/// Convert the designated columns to a dictionary-encoded categorical
/// representation, in place. Missing columns are silently skipped.
pub fn to_categoricals(df: &mut DataFrame, columns: &[String]) -> Result<()> {
    for name in columns {
        let cast = {
            let Ok(col) = df.column(name) else {
                continue;
            };
            col.cast(&DataType::Categorical(None, Default::default()))
                .with_context(|| format!("Failed to categorical-encode column '{}'", name))?
        };
        df.with_column(cast)?;
    }
    Ok(())
}

/// Restrict the table to decided applications and derive the denial label.
///
/// Rows whose action-taken code is outside approved ∪ denied are dropped.
/// The returned table carries a boolean `denied_flag` column that is true
/// exactly when the code is in the denied set.
pub fn apply_action_taken_flag(
    df: &DataFrame,
    approved: &[i64],
    denied: &[i64],
) -> Result<DataFrame> {
    let action = df
        .column(ACTION_TAKEN_COLUMN)
        .context("action_taken column is required to derive the denial label")?
        .cast(&DataType::Int64)?;
    let codes = action.i64()?;

    let approved_set: HashSet<i64> = approved.iter().copied().collect();
    let denied_set: HashSet<i64> = denied.iter().copied().collect();

    let keep: Vec<bool> = codes
        .into_iter()
        .map(|code| match code {
            Some(c) => approved_set.contains(&c) || denied_set.contains(&c),
            None => false,
        })
        .collect();

    let mut filtered = df.filter(&BooleanChunked::from_slice("keep".into(), &keep))?;

    let denied_flags: Vec<bool> = filtered
        .column(ACTION_TAKEN_COLUMN)?
        .cast(&DataType::Int64)?
        .i64()?
        .into_iter()
        .map(|code| code.is_some_and(|c| denied_set.contains(&c)))
        .collect();

    filtered.with_column(Column::new(
        crate::pipeline::TARGET_COLUMN.into(),
        denied_flags,
    ))?;
    Ok(filtered)
}

/// Drop every column the schema marks with `role: drop`.
pub fn drop_schema_dropped(df: &mut DataFrame, schema: &SchemaConfig) {
    let dropped: Vec<String> = schema
        .columns_by_role(Role::Drop)
        .into_iter()
        .filter(|name| df.column(name).is_ok())
        .collect();
    if !dropped.is_empty() {
        *df = df.drop_many(dropped);
    }
}

/// Run the full cleaning stage over a raw all-string table.
///
/// Consumes the input and returns the cleaned table restricted to decided
/// applications, with `denied_flag` derived.
pub fn run_cleaning(settings: &Settings, df: DataFrame) -> Result<DataFrame> {
    let mut df = df;
    let cleaning = &settings.cleaning;

    print_step_header(1, "Null-like token scan");
    let hits = null_like_check(&df, &cleaning.null_like, cleaning.sample_frac)?;
    if hits.is_empty() {
        print_info("No null-like tokens found in sampled values");
    } else {
        print_count("column(s) with null-like tokens", hits.len(), None);
        for hit in &hits {
            print_info(&format!("{}: {:.1}%", hit.column, hit.fraction * 100.0));
        }
    }

    print_step_header(2, "Exemption sentinel split");
    strip_string_columns(&mut df)?;
    let flags = apply_exempt_split(&mut df, &cleaning.exempt_columns, &cleaning.exempt_sentinels)?;
    print_count("exemption flag column(s) created", flags.len(), None);

    print_step_header(3, "Schema-driven type coercion");
    let outcomes = convert_by_schema(&mut df, &settings.schema)?;
    let failed: i64 = outcomes.iter().map(|o| o.failures).sum();
    print_success(&format!(
        "Converted {} column(s), {} coercion failure(s)",
        outcomes.len(),
        failed
    ));

    drop_schema_dropped(&mut df, &settings.schema);
    to_categoricals(&mut df, &settings.schema.categorical_dtype_columns())?;

    print_step_header(4, "Denial label derivation");
    let before = df.height();
    let df = apply_action_taken_flag(
        &df,
        &cleaning.action_taken.approved,
        &cleaning.action_taken.denied,
    )?;
    print_count(
        "row(s) outside the approved/denied population dropped",
        before - df.height(),
        None,
    );
    print_success(&format!("{} decided application(s) retained", df.height()));

    Ok(df)
}
