//! HMDA denial modeling pipeline
//!
//! Library crate behind the `hmda-pipeline` CLI. The pipeline takes the
//! raw pipe-delimited 2024 LAR extract through conversion, schema-driven
//! cleaning, exploratory analysis, feature engineering and an elastic-net
//! logistic regression on the derived denial label.

pub mod cli;
pub mod config;
pub mod pipeline;
pub mod report;
pub mod utils;
