//! Report generation: schema summaries, metric exports and figure rendering

pub mod metrics;
pub mod plots;
pub mod schema_summary;

pub use metrics::*;
pub use schema_summary::*;
