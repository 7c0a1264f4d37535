//! Page loading and script collection in a real Chrome session.
//!
//! Network events are recorded from before navigation starts, so every request
//! of the load (including the main document) has a record by the time the page
//! settles. Collection then runs against the live page while its network cache
//! still holds the response bodies.
//!
//! Requires: Chrome or Chromium browser installed (or a managed download)

use crate::capability::PassContext;
use crate::capture::chrome_page::ChromePage;
use crate::capture::network_log::{resource_type_from_cdp, ChromeNetworkLog, NetworkRecorder};
use crate::collector::{CollectedScripts, ScriptCollector};
use crate::types::{GatherError, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EventRequestWillBeSent, EventResponseReceived};
use chromiumoxide::cdp::browser_protocol::page::EventFrameNavigated;
use chromiumoxide::Handler;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counter for generating unique browser profile directories
static BROWSER_INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Restart the browser after this many pages to keep memory in check.
const RESTART_EVERY: usize = 50;

/// Scripts collected from one loaded page.
#[derive(Debug, Clone)]
pub struct PageCollection {
    /// URL of the document the main frame loaded (after redirects).
    pub page_url: String,
    pub scripts: CollectedScripts,
}

/// Outcome for one URL of a multi-page run.
#[derive(Debug)]
pub struct PageCapture {
    pub url: String,
    pub result: Result<PageCollection>,
    /// Time spent on this URL, including any browser restart it triggered.
    pub elapsed: Duration,
}

impl PageCapture {
    fn new(url: &str, result: Result<PageCollection>, elapsed: Duration) -> Self {
        Self {
            url: url.to_string(),
            result,
            elapsed,
        }
    }
}

/// A running browser plus the task driving its CDP connection.
struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    fn start(browser: Browser, mut handler: Handler) -> Self {
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        Self {
            browser,
            handler_task,
        }
    }

    fn shutdown(self) {
        drop(self.browser);
        self.handler_task.abort();
    }
}

/// Browser-driven page loader that collects scripts after each load.
pub struct BrowserCapture {
    /// Timeout for page load in seconds
    timeout_secs: u64,
    /// Whether to run headless
    headless: bool,
    /// Fast mode: shorter settle wait after load
    fast_mode: bool,
    /// Explicit path to Chrome/Chromium executable
    chrome_executable: Option<PathBuf>,
    collector: ScriptCollector,
}

impl BrowserCapture {
    /// Create a new browser capture instance.
    pub fn new(timeout_secs: u64, headless: bool) -> Self {
        Self {
            timeout_secs,
            headless,
            fast_mode: false,
            chrome_executable: None,
            collector: ScriptCollector::new(),
        }
    }

    /// Enable fast mode for quicker runs.
    pub fn with_fast_mode(mut self, fast: bool) -> Self {
        self.fast_mode = fast;
        self
    }

    /// Set an explicit Chrome/Chromium executable path.
    pub fn with_chrome_executable(mut self, path: Option<PathBuf>) -> Self {
        self.chrome_executable = path;
        self
    }

    /// Use the given collector for every page.
    pub fn with_collector(mut self, collector: ScriptCollector) -> Self {
        self.collector = collector;
        self
    }

    /// Build a BrowserConfig with the given temp directory.
    fn build_browser_config(&self, temp_dir: &Path, chrome_exe: Option<&Path>) -> Result<BrowserConfig> {
        let mut config_builder = BrowserConfig::builder().user_data_dir(temp_dir);

        if let Some(exe) = chrome_exe {
            config_builder = config_builder.chrome_executable(exe);
        }

        if !self.headless {
            config_builder = config_builder.with_head();
        }

        config_builder = config_builder.no_sandbox().viewport(None);

        config_builder
            .build()
            .map_err(|e| GatherError::ConfigError(format!("Failed to build browser config: {}", e)))
    }

    /// Launch a browser, with auto-download fallback if no Chrome is found.
    async fn launch_browser(&self, temp_dir: &Path) -> Result<BrowserSession> {
        // Explicit path > previously downloaded > system Chrome
        let chrome_exe = self
            .chrome_executable
            .clone()
            .or_else(crate::browser::resolve_chrome_executable);

        let launch_result = match self.build_browser_config(temp_dir, chrome_exe.as_deref()) {
            Ok(config) => Browser::launch(config).await,
            Err(e) => Err(chromiumoxide::error::CdpError::msg(e.to_string())),
        };

        match launch_result {
            Ok((browser, handler)) => Ok(BrowserSession::start(browser, handler)),
            Err(e) => {
                if let Some(exe) = chrome_exe {
                    return Err(GatherError::Browser(format!(
                        "Failed to launch browser with Chrome at {:?}: {}",
                        exe, e
                    )));
                }

                warn!(
                    "Chrome not found, downloading Chromium automatically... (run `scriptgather setup` to pre-install)"
                );
                let exe = crate::browser::download_chrome(false).await?;

                let config = self.build_browser_config(temp_dir, Some(&exe))?;
                let (browser, handler) = Browser::launch(config).await.map_err(|e| {
                    GatherError::Browser(format!(
                        "Failed to launch browser even after downloading Chromium: {}",
                        e
                    ))
                })?;
                Ok(BrowserSession::start(browser, handler))
            }
        }
    }

    fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs + 15)
    }

    /// Load a single URL in a fresh browser and collect its scripts.
    pub async fn capture(&self, url: &str) -> Result<PageCollection> {
        info!("Collecting scripts from {}", url);

        let temp_dir = new_profile_dir();
        let session = self.launch_browser(&temp_dir).await?;

        let page_timeout = self.page_timeout();
        let outcome = tokio::time::timeout(page_timeout, self.collect_page(&session.browser, url)).await;
        let result = match outcome {
            Ok(r) => r,
            Err(_) => Err(GatherError::Browser(format!(
                "Hard timeout after {}s for {}",
                page_timeout.as_secs(),
                url
            ))),
        };

        session.shutdown();
        cleanup_profile_dir(temp_dir);

        result
    }

    /// Load several URLs with a shared browser instance.
    /// Returns one outcome per URL, in input order.
    pub async fn capture_multiple(&self, urls: &[&str]) -> Vec<PageCapture> {
        if urls.is_empty() {
            return Vec::new();
        }

        info!("Collecting scripts from {} URLs with shared browser instance", urls.len());

        let temp_dir = new_profile_dir();
        let mut results = Vec::with_capacity(urls.len());

        let mut session = match self.launch_browser(&temp_dir).await {
            Ok(session) => Some(session),
            Err(e) => {
                for url in urls {
                    results.push(PageCapture::new(
                        url,
                        Err(GatherError::Browser(format!("Browser launch failed: {}", e))),
                        Duration::ZERO,
                    ));
                }
                cleanup_profile_dir(temp_dir);
                return results;
            }
        };

        let mut pages_used = 0;

        for url in urls {
            let started = Instant::now();
            let needs_restart = session.is_none() || (pages_used > 0 && pages_used % RESTART_EVERY == 0);
            if needs_restart {
                if let Some(old) = session.take() {
                    info!("Restarting browser after {} pages to free memory", pages_used);
                    old.shutdown();
                }
                match self.launch_browser(&temp_dir).await {
                    Ok(new_session) => {
                        session = Some(new_session);
                        pages_used = 0;
                    }
                    Err(e) => {
                        results.push(PageCapture::new(
                            url,
                            Err(GatherError::Browser(format!("Browser restart failed: {}", e))),
                            started.elapsed(),
                        ));
                        continue;
                    }
                }
            }

            let Some(ref current) = session else {
                continue;
            };

            let page_timeout = self.page_timeout();
            let outcome =
                tokio::time::timeout(page_timeout, self.collect_page(&current.browser, url)).await;
            let result = match outcome {
                Ok(r) => r,
                Err(_) => {
                    warn!(
                        "Hard timeout after {}s for {}, killing browser",
                        page_timeout.as_secs(),
                        url
                    );
                    // Chrome may be spinning; the next URL gets a fresh instance.
                    if let Some(hung) = session.take() {
                        hung.shutdown();
                    }
                    Err(GatherError::Browser(format!(
                        "Hard timeout after {}s for {}",
                        page_timeout.as_secs(),
                        url
                    )))
                }
            };
            results.push(PageCapture::new(url, result, started.elapsed()));
            pages_used += 1;
        }

        if let Some(session) = session {
            session.shutdown();
        }
        cleanup_profile_dir(temp_dir);

        results
    }

    /// Load `url` in a new tab, wait for the network to settle, and collect scripts.
    async fn collect_page(&self, browser: &Browser, url: &str) -> Result<PageCollection> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| GatherError::Browser(format!("Failed to create page: {}", e)))?;

        let recorder = NetworkRecorder::new();

        let mut request_events = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| GatherError::Browser(format!("Failed to set up event listener: {}", e)))?;
        let mut response_events = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| GatherError::Browser(format!("Failed to set up event listener: {}", e)))?;
        let mut navigation_events = page
            .event_listener::<EventFrameNavigated>()
            .await
            .map_err(|e| GatherError::Browser(format!("Failed to set up event listener: {}", e)))?;

        let request_recorder = recorder.clone();
        let request_task = tokio::spawn(async move {
            while let Some(event) = request_events.next().await {
                request_recorder
                    .on_request(
                        event.request_id.inner(),
                        &event.request.url,
                        event.r#type.as_ref().map(resource_type_from_cdp),
                    )
                    .await;
            }
        });

        let response_recorder = recorder.clone();
        let response_task = tokio::spawn(async move {
            while let Some(event) = response_events.next().await {
                response_recorder
                    .on_response(event.request_id.inner(), resource_type_from_cdp(&event.r#type))
                    .await;
            }
        });

        // Same-document history changes don't fire this, so the URL stays the loaded document's.
        let navigation_recorder = recorder.clone();
        let navigation_task = tokio::spawn(async move {
            while let Some(event) = navigation_events.next().await {
                if event.frame.parent_id.is_none() {
                    navigation_recorder.on_main_frame_navigated(&event.frame.url).await;
                }
            }
        });

        debug!("Navigating to: {}", url);
        let navigate_result =
            tokio::time::timeout(Duration::from_secs(self.timeout_secs), page.goto(url)).await;

        match navigate_result {
            Ok(Ok(_)) => debug!("Navigation completed"),
            Ok(Err(e)) => warn!("Navigation error (continuing): {}", e),
            Err(_) => warn!("Navigation timeout (continuing with recorded requests)"),
        }

        self.wait_for_network_quiet(&recorder).await;

        request_task.abort();
        response_task.abort();
        navigation_task.abort();

        let page_url = match recorder.document_url().await {
            Some(document_url) => document_url,
            None => page
                .url()
                .await
                .map_err(|e| GatherError::Browser(format!("Failed to read page URL: {}", e)))?
                .unwrap_or_else(|| url.to_string()),
        };

        let records = recorder.snapshot().await;
        debug!("Recorded {} network requests for {}", records.len(), page_url);

        let executor = ChromePage::new(page.clone());
        let network = ChromeNetworkLog::new(page.clone(), records);
        let pass = PassContext::new(page_url.clone(), &executor);

        let collected = self.collector.collect_detailed(&pass, &network).await;

        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }

        let scripts = collected?;
        info!(
            "Collected {} inline and {} external scripts from {}",
            scripts.inline.len(),
            scripts.external.len(),
            page_url
        );

        Ok(PageCollection { page_url, scripts })
    }

    /// Adaptive wait: stop once no new requests have appeared for 1.5s.
    async fn wait_for_network_quiet(&self, recorder: &NetworkRecorder) {
        let max_wait_secs = if self.fast_mode { 1 } else { 3 };
        let check_interval_ms = 500;
        let max_checks = (max_wait_secs * 1000) / check_interval_ms;

        let mut last_count = recorder.len().await;
        let mut no_change_count = 0;

        debug!("Waiting up to {}s for the network to settle...", max_wait_secs);
        for _ in 0..max_checks {
            tokio::time::sleep(Duration::from_millis(check_interval_ms)).await;

            let current_count = recorder.len().await;
            if current_count == last_count {
                no_change_count += 1;
                if no_change_count >= 3 {
                    debug!("No new requests for 1.5s, stopping early");
                    break;
                }
            } else {
                no_change_count = 0;
                last_count = current_count;
            }
        }
    }
}

impl Default for BrowserCapture {
    fn default() -> Self {
        Self::new(30, true)
    }
}

/// Unique profile directory so parallel browser instances don't collide.
fn new_profile_dir() -> PathBuf {
    let instance_id = BROWSER_INSTANCE_COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_dir = std::env::temp_dir().join(format!(
        "scriptgather-browser-{}-{}",
        std::process::id(),
        instance_id
    ));

    if let Err(e) = std::fs::create_dir_all(&temp_dir) {
        debug!("Failed to create temp dir {:?}: {}", temp_dir, e);
    }
    temp_dir
}

/// Remove a profile directory in the background once Chrome has exited.
fn cleanup_profile_dir(temp_dir: PathBuf) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Err(e) = std::fs::remove_dir_all(&temp_dir) {
            debug!("Failed to cleanup temp dir {:?}: {}", temp_dir, e);
        }
    });
}
