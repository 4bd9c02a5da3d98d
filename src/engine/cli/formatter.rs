//! CLI Output Formatting Module
//! Provides consistent, colorized output for terminal UX

use colored::{ColoredString, Colorize};

use crate::engine::rbac::Right;

pub struct CliFormatter;

fn status_line(marker: ColoredString, message: &str) -> String {
    format!("{} {}", marker, message)
}

impl CliFormatter {
    pub fn success(message: &str) {
        println!("{}", status_line("✓".green().bold(), message));
    }

    /// Errors go to stderr so `--format json` output stays parseable.
    pub fn error(message: &str) {
        eprintln!("{}", status_line("✗".red().bold(), message));
    }

    pub fn warning(message: &str) {
        println!("{}", status_line("!".yellow().bold(), message));
    }

    pub fn info(message: &str) {
        println!("{}", status_line("·".blue().bold(), message));
    }

    pub fn header(title: &str) {
        let rule = "─".repeat(title.chars().count());
        println!("\n{}\n{}", title.bright_cyan().bold(), rule.bright_black());
    }

    /// Key and value, keys right-aligned so consecutive pairs line up.
    pub fn kv(key: &str, value: &str) {
        println!("  {:>18}  {}", key.bold(), value);
    }

    pub fn item(text: &str) {
        println!("    - {}", text);
    }

    pub fn table_header(columns: &[&str]) {
        Self::table_row(columns);
        let width = columns.iter().map(|c| c.chars().count() + 3).sum::<usize>();
        println!("  {}", "─".repeat(width.saturating_sub(3)).bright_black());
    }

    pub fn table_row(values: &[&str]) {
        println!("  {}", values.join(" | "));
    }

    pub fn blank() {
        println!();
    }
}

/// Compact description of a right, e.g. `Todo rw own` or `Role r any`.
pub fn describe_right(right: &Right) -> String {
    let mut flags = String::new();
    if right.read {
        flags.push('r');
    }
    if right.write {
        flags.push('w');
    }
    if flags.is_empty() {
        flags.push('-');
    }
    let scope = if right.only_own { "own" } else { "any" };
    format!("{} {} {}", right.model, flags, scope)
}

/// Format duration in human-readable format
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
