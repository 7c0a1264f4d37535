//! Chrome-backed implementations of the collector's capabilities.
//!
//! This module handles:
//! - Launching Chromium and loading target pages
//! - Recording network requests during the load
//! - Evaluating page functions in an isolated world
//! - Reading cached response bodies

pub mod browser_capture;
pub mod chrome_page;
pub mod network_log;

pub use browser_capture::{BrowserCapture, PageCapture, PageCollection};
pub use chrome_page::ChromePage;
pub use network_log::{ChromeNetworkLog, NetworkRecorder};
