//! Core types and errors for script collection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while gathering scripts.
#[derive(Error, Debug)]
pub enum GatherError {
    #[error("Page evaluation failed: {0}")]
    Execution(String),

    #[error("Page evaluation returned an unexpected result: {0}")]
    EvaluationResult(#[source] serde_json::Error),

    #[error("Could not locate main resource for {url}")]
    MainResourceNotFound { url: String },

    #[error("Response body unavailable for request {request_id}: {reason}")]
    BodyUnavailable { request_id: String, reason: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatherError>;

/// Resource classification of a network request, as reported by the browser.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    TextTrack,
    #[serde(rename = "XHR")]
    Xhr,
    Fetch,
    EventSource,
    WebSocket,
    Manifest,
    Ping,
    Preflight,
    Other,
}

/// One network exchange observed during a page load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    /// Stable identifier for the exchange.
    pub request_id: String,
    /// The resource URL as observed on the wire.
    pub url: String,
    /// Browser classification of the resource.
    pub resource_type: ResourceType,
}

impl NetworkRecord {
    pub fn new(
        request_id: impl Into<String>,
        url: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            url: url.into(),
            resource_type,
        }
    }

    pub fn is_script(&self) -> bool {
        self.resource_type == ResourceType::Script
    }
}

/// The source text of one script, attributed to the request it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptArtifact {
    /// Full text of the script.
    pub code: String,
    /// Request the script is attributed to. Inline scripts use the main document's id.
    pub request_id: String,
}

/// Outcome of fetching the body of a single script record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyOutcome {
    /// Non-empty body.
    Content(String),
    /// The request completed but carried no content.
    Empty,
    /// The body could not be retrieved (evicted, blocked, never finished).
    Unavailable(String),
}

impl BodyOutcome {
    /// Fold a store result into an outcome. Only this failure class is absorbed.
    pub fn from_fetch(fetched: Result<Option<String>>) -> Self {
        match fetched {
            Ok(Some(body)) if !body.is_empty() => BodyOutcome::Content(body),
            Ok(_) => BodyOutcome::Empty,
            Err(e) => BodyOutcome::Unavailable(e.to_string()),
        }
    }

    pub fn into_content(self) -> Option<String> {
        match self {
            BodyOutcome::Content(body) => Some(body),
            BodyOutcome::Empty | BodyOutcome::Unavailable(_) => None,
        }
    }
}

/// Collection result for a single target page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageScripts {
    /// Target URL that was requested.
    pub target: String,
    /// URL of the loaded document (after redirects).
    pub page_url: Option<String>,
    /// Collected scripts: inline first, then external in request order.
    pub scripts: Vec<ScriptArtifact>,
    /// Number of inline scripts in `scripts`.
    pub inline_count: usize,
    /// Number of external scripts in `scripts`.
    pub external_count: usize,
    /// Time spent on this target in seconds.
    pub duration_secs: f64,
    /// Fatal error that aborted collection, if any.
    pub error: Option<String>,
}

impl PageScripts {
    pub fn failed(target: &str, error: String, duration_secs: f64) -> Self {
        Self {
            target: target.to_string(),
            page_url: None,
            scripts: Vec::new(),
            inline_count: 0,
            external_count: 0,
            duration_secs,
            error: Some(error),
        }
    }
}
