//! Colored console output for collection results.

use crate::types::PageScripts;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Longest script preview shown in verbose listings.
const PREVIEW_CHARS: usize = 60;

/// Console output handler with colors and formatting.
pub struct ConsoleOutput {
    verbose: bool,
    json_mode: bool,
    quiet: bool,
}

impl ConsoleOutput {
    /// Create a new console output handler.
    pub fn new(verbose: bool, json_mode: bool, quiet: bool) -> Self {
        Self {
            verbose,
            json_mode,
            quiet,
        }
    }

    /// Print the result for one page.
    pub fn print_page(&self, result: &PageScripts) {
        if self.json_mode {
            return;
        }

        if let Some(ref error) = result.error {
            println!(
                "{} {} {}",
                "[!]".red().bold(),
                result.target.bright_white(),
                error.red()
            );
            return;
        }

        if self.quiet {
            return;
        }

        println!(
            "{} {} {} inline, {} external ({:.2}s)",
            "[*]".bright_blue(),
            result.target.bright_white(),
            result.inline_count.to_string().green(),
            result.external_count.to_string().green(),
            result.duration_secs
        );

        if let Some(ref page_url) = result.page_url {
            if page_url != &result.target {
                println!("    |-- Final URL: {}", page_url.dimmed());
            }
        }

        if self.verbose {
            for script in &result.scripts {
                println!(
                    "    |-- [{}] {} ({} bytes)",
                    script.request_id.dimmed(),
                    preview(&script.code),
                    script.code.len()
                );
            }
        }
    }

    /// Print totals across all pages.
    pub fn print_summary(&self, results: &[PageScripts]) {
        if self.json_mode || self.quiet {
            return;
        }

        let scripts: usize = results.iter().map(|r| r.scripts.len()).sum();
        let failed = results.iter().filter(|r| r.error.is_some()).count();

        println!();
        println!("{}", "=== Summary ===".bright_cyan());
        println!("  Pages:    {}", results.len());
        println!("  Scripts:  {}", scripts);
        if failed > 0 {
            println!("  {}", format!("Failed pages: {}", failed).red().bold());
        }
        println!();
    }

    /// Create a progress bar.
    pub fn create_progress_bar(&self, total: u64, message: &str) -> Option<ProgressBar> {
        if self.json_mode || total < 2 {
            return None;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(message.to_string());
        Some(pb)
    }
}

/// First line of a script, shortened for display.
fn preview(code: &str) -> String {
    let first_line = code.lines().next().unwrap_or_default().trim();
    let mut shown: String = first_line.chars().take(PREVIEW_CHARS).collect();
    if first_line.chars().count() > PREVIEW_CHARS || code.lines().nth(1).is_some() {
        shown.push_str("...");
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_output_creation() {
        let output = ConsoleOutput::new(true, false, false);
        assert!(output.verbose);
        assert!(!output.json_mode);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("console.log(1)"), "console.log(1)");
        assert_eq!(preview("a()\nb()"), "a()...");
        let long = "x".repeat(100);
        assert_eq!(preview(&long).len(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_no_progress_bar_in_json_mode() {
        let output = ConsoleOutput::new(false, true, false);
        assert!(output.create_progress_bar(10, "Loading").is_none());
        let output = ConsoleOutput::new(false, false, false);
        assert!(output.create_progress_bar(1, "Loading").is_none());
    }
}
