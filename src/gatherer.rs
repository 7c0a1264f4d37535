//! Per-target orchestration: load pages, collect scripts, report results.

use crate::capture::{BrowserCapture, PageCollection};
use crate::collector::ScriptCollector;
use crate::config::CollectConfig;
use crate::output::ConsoleOutput;
use crate::types::{PageScripts, Result};
use std::time::{Duration, Instant};
use tracing::debug;

/// Collects scripts for one or more target pages.
pub struct Gatherer {
    capture: BrowserCapture,
    console: ConsoleOutput,
}

impl Gatherer {
    /// Create a gatherer from CLI configuration.
    pub fn new(config: &CollectConfig, verbose: bool) -> Self {
        // Explicit flag > managed install > system default
        let chrome_exe = config
            .chrome_path
            .clone()
            .or_else(crate::browser::resolve_chrome_executable);

        let collector = ScriptCollector::new().with_concurrency(config.concurrency);

        let capture = BrowserCapture::new(config.timeout, !config.headful)
            .with_fast_mode(config.fast)
            .with_chrome_executable(chrome_exe)
            .with_collector(collector);

        Self {
            capture,
            console: ConsoleOutput::new(verbose, config.json, config.quiet),
        }
    }

    /// Collect scripts from a single page.
    pub async fn gather(&self, target: &str) -> PageScripts {
        let started = Instant::now();
        let outcome = self.capture.capture(target).await;
        let result = page_result(target, outcome, started.elapsed());
        self.console.print_page(&result);
        result
    }

    /// Collect scripts from several pages sharing one browser. Results keep input order.
    pub async fn gather_multiple(&self, targets: &[String]) -> Vec<PageScripts> {
        let results = if targets.len() == 1 {
            vec![self.gather(&targets[0]).await]
        } else {
            let pb = self
                .console
                .create_progress_bar(targets.len() as u64, "Loading pages");

            let refs: Vec<&str> = targets.iter().map(String::as_str).collect();
            let captured = self.capture.capture_multiple(&refs).await;

            let results: Vec<PageScripts> = captured
                .into_iter()
                .map(|page| {
                    let result = page_result(&page.url, page.result, page.elapsed);
                    if let Some(ref pb) = pb {
                        pb.inc(1);
                    }
                    result
                })
                .collect();

            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            for result in &results {
                self.console.print_page(result);
            }
            results
        };

        self.console.print_summary(&results);
        results
    }
}

/// Turn a capture outcome into a reportable result. Fatal errors keep no scripts.
fn page_result(target: &str, outcome: Result<PageCollection>, elapsed: Duration) -> PageScripts {
    let duration_secs = elapsed.as_secs_f64();
    match outcome {
        Ok(collection) => {
            let inline_count = collection.scripts.inline.len();
            let external_count = collection.scripts.external.len();
            PageScripts {
                target: target.to_string(),
                page_url: Some(collection.page_url),
                scripts: collection.scripts.into_artifacts(),
                inline_count,
                external_count,
                duration_secs,
                error: None,
            }
        }
        Err(e) => {
            debug!("Collection failed for {}: {}", target, e);
            PageScripts::failed(target, e.to_string(), duration_secs)
        }
    }
}
