//! Shared utilities: progress indicators, terminal styling, numeric helpers

pub mod progress;
pub mod stats;
pub mod styling;

pub use progress::*;
pub use styling::*;
