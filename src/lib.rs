//! scriptgather - collects the source of every script a page load used.
//!
//! For each page it produces an ordered list of `(code, requestId)` pairs:
//! - Inline `<script>` text read from the live document, attributed to the
//!   main document request
//! - External script bodies read from the browser's network cache, in request order
//!
//! The collection algorithm ([`collector::ScriptCollector`]) only depends on the
//! two capability traits in [`capability`]; [`capture`] implements them over
//! Chrome DevTools.
//!
//! # Example
//!
//! ```no_run
//! use scriptgather::capture::BrowserCapture;
//!
//! #[tokio::main]
//! async fn main() {
//!     let capture = BrowserCapture::default();
//!     let page = capture.capture("https://example.com").await.unwrap();
//!     println!(
//!         "Collected {} scripts",
//!         page.scripts.inline.len() + page.scripts.external.len()
//!     );
//! }
//! ```

pub mod browser;
pub mod capability;
pub mod capture;
pub mod collector;
pub mod config;
pub mod gatherer;
pub mod output;
pub mod types;
pub mod url_match;

pub use capability::{EvaluateOptions, NetworkRecordStore, PageExecutor, PageFunction, PassContext};
pub use collector::{CollectedScripts, ScriptCollector};
pub use config::{CollectConfig, Commands, Config, SetupConfig};
pub use gatherer::Gatherer;
pub use types::{
    BodyOutcome, GatherError, NetworkRecord, PageScripts, ResourceType, Result, ScriptArtifact,
};
