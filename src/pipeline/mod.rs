//! Pipeline stages: ingestion, cleaning, EDA, feature engineering, modeling

pub mod clean;
pub mod correlation;
pub mod eda;
pub mod features;
pub mod loader;
pub mod model;
pub mod scale;
pub mod split;

pub use clean::*;
pub use correlation::*;
pub use eda::*;
pub use features::*;
pub use loader::*;
pub use model::*;
pub use scale::*;
pub use split::*;

use anyhow::Result;
use polars::prelude::*;

/// Name of the derived binary denial label.
pub const TARGET_COLUMN: &str = "denied_flag";

/// Stringified view of a column, used for sentinel comparison and grouping.
pub(crate) fn column_to_strings(col: &Column) -> Result<Vec<Option<String>>> {
    let cast = col.cast(&DataType::String)?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}
