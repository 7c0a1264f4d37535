//! Command-line configuration.

use crate::types::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Collects inline and external script sources from page loads.
#[derive(Parser, Debug, Clone)]
#[command(name = "scriptgather")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Load pages and collect their scripts
    Collect(CollectConfig),
    /// Download and set up a managed Chromium browser
    Setup(SetupConfig),
}

/// Configuration for the setup command.
#[derive(Parser, Debug, Clone)]
pub struct SetupConfig {
    /// Force re-download even if Chromium is already installed
    #[arg(long)]
    pub force: bool,
}

/// Configuration for the collect command.
#[derive(Parser, Debug, Clone)]
pub struct CollectConfig {
    /// Page URL(s) to load
    #[arg(required_unless_present = "file")]
    pub targets: Vec<String>,

    /// File containing URLs to load (one per line)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Write JSON results to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Page load timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Maximum concurrent response body reads per page
    #[arg(long, short = 'c', default_value = "1")]
    pub concurrency: usize,

    /// Fast mode: shorter network settle wait (may miss late requests)
    #[arg(long)]
    pub fast: bool,

    /// Quiet mode: only report failed targets
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Path to Chrome/Chromium executable (overrides auto-detection)
    #[arg(long, env = "SCRIPTGATHER_CHROME")]
    pub chrome_path: Option<PathBuf>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            file: None,
            json: false,
            output: None,
            timeout: 30,
            concurrency: 1,
            fast: false,
            quiet: false,
            headful: false,
            chrome_path: None,
        }
    }
}

impl CollectConfig {
    /// Targets from the command line followed by those in `--file`, with a scheme.
    pub fn load_targets(&self) -> Result<Vec<String>> {
        let mut targets = self.targets.clone();

        if let Some(ref file_path) = self.file {
            let content = std::fs::read_to_string(file_path)?;
            targets.extend(parse_target_list(&content));
        }

        Ok(targets.into_iter().map(|t| with_scheme(&t)).collect())
    }
}

/// Non-blank, non-comment lines of a target list.
fn parse_target_list(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

/// Default bare hosts to https.
fn with_scheme(target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("https://{}", target)
    }
}
