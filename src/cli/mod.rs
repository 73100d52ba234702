//! Command-line interface: argument parsing and the convert subcommand

pub mod args;
pub mod convert;

pub use args::{Cli, Commands};
