//! Spinner helpers for long-running pipeline steps

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner for indeterminate work, indented to line up with step output.
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("   {spinner:.cyan} {msg}")
            .unwrap()
            .tick_chars("◐◓◑◒ "),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Finish a spinner with the same check glyph the stage output uses.
pub fn finish_with_success(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("{} {}", style("✓").green(), message));
}
