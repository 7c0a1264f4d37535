//! Interfaces the collector needs from the live browser session.

use crate::types::{NetworkRecord, Result};
use async_trait::async_trait;
use serde_json::Value;

/// A page-side routine the executor knows how to run.
///
/// The page-side source for each routine belongs to the executor implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFunction {
    /// Trimmed text of every `<script>` without a `src` attribute and with
    /// non-blank content, in document order (shadow roots included).
    InlineScriptTexts,
}

/// Options for a single page evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluateOptions {
    /// Run in a context isolated from page-defined globals.
    pub use_isolation: bool,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self { use_isolation: true }
    }
}

/// Runs a routine against the loaded page and returns its serialized result.
#[async_trait]
pub trait PageExecutor: Send + Sync {
    async fn evaluate(&self, function: PageFunction, options: EvaluateOptions) -> Result<Value>;
}

/// Network activity recorded for a completed page load.
#[async_trait]
pub trait NetworkRecordStore: Send + Sync {
    /// Observed requests in the order they were first seen.
    fn records(&self) -> &[NetworkRecord];

    /// Cached response body. `Ok(None)` means the request had no content.
    async fn get_body(&self, request_id: &str) -> Result<Option<String>>;
}

/// Page-load context a collection pass runs against.
pub struct PassContext<'a> {
    /// The page's current URL.
    pub url: String,
    pub executor: &'a dyn PageExecutor,
}

impl<'a> PassContext<'a> {
    pub fn new(url: impl Into<String>, executor: &'a dyn PageExecutor) -> Self {
        Self {
            url: url.into(),
            executor,
        }
    }
}
