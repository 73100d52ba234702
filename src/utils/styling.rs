//! Terminal styling helpers for pipeline stage output

use console::style;

/// Print a numbered stage header
pub fn print_step_header(step: usize, title: &str) {
    println!();
    println!(
        "    {} {}",
        style(format!("[{}]", step)).cyan().bold(),
        style(title).white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
}

/// Print a success line
pub fn print_success(message: &str) {
    println!("      {} {}", style("✓").green().bold(), message);
}

/// Print an informational line
pub fn print_info(message: &str) {
    println!("      {} {}", style("ℹ").cyan(), message);
}

/// Print a warning line (recoverable conditions, e.g. coercion failures)
pub fn print_warning(message: &str) {
    println!("      {} {}", style("!").yellow().bold(), message);
}

/// Print a labelled count, e.g. "3 column(s) with null-like tokens"
pub fn print_count(label: &str, count: usize, detail: Option<&str>) {
    match detail {
        Some(d) => println!(
            "      {} {} {}",
            style(count).yellow().bold(),
            label,
            style(d).dim()
        ),
        None => println!("      {} {}", style(count).yellow().bold(), label),
    }
}
