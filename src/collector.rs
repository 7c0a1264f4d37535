//! Script content collection for a single page load.
//!
//! Inline scripts are read out of the live document and attributed to the main
//! document request. External scripts come from the response bodies the browser
//! cached for every `Script` request. A missing body only drops that script; a
//! failed page evaluation or an unattributable inline script fails the run.

use crate::capability::{EvaluateOptions, NetworkRecordStore, PageFunction, PassContext};
use crate::types::{BodyOutcome, GatherError, NetworkRecord, Result, ScriptArtifact};
use crate::url_match::equal_without_fragment;
use futures::stream::{self, StreamExt};
use tracing::{debug, trace};

/// Scripts collected from one page, split by origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedScripts {
    /// Inline scripts in document order.
    pub inline: Vec<ScriptArtifact>,
    /// External scripts in network record order.
    pub external: Vec<ScriptArtifact>,
}

impl CollectedScripts {
    /// Inline artifacts followed by external artifacts.
    pub fn into_artifacts(self) -> Vec<ScriptArtifact> {
        let mut scripts = self.inline;
        scripts.extend(self.external);
        scripts
    }
}

/// Collects inline and external script sources for a loaded page.
#[derive(Debug, Clone)]
pub struct ScriptCollector {
    /// Maximum number of body retrievals in flight.
    concurrency: usize,
}

impl ScriptCollector {
    /// Create a collector that retrieves bodies one at a time.
    pub fn new() -> Self {
        Self { concurrency: 1 }
    }

    /// Allow up to `concurrency` body retrievals in flight. Output order is unaffected.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Collect all scripts: inline first, then external.
    pub async fn collect(
        &self,
        pass: &PassContext<'_>,
        load: &dyn NetworkRecordStore,
    ) -> Result<Vec<ScriptArtifact>> {
        Ok(self.collect_detailed(pass, load).await?.into_artifacts())
    }

    /// Same as [`collect`](Self::collect) but keeps inline and external scripts apart.
    pub async fn collect_detailed(
        &self,
        pass: &PassContext<'_>,
        load: &dyn NetworkRecordStore,
    ) -> Result<CollectedScripts> {
        let inline_texts = self.inline_script_texts(pass).await?;

        let mut inline = Vec::with_capacity(inline_texts.len());
        if !inline_texts.is_empty() {
            let main_resource = find_main_resource(load.records(), &pass.url).ok_or_else(|| {
                GatherError::MainResourceNotFound {
                    url: pass.url.clone(),
                }
            })?;
            debug!(
                "Attributing {} inline scripts to {} ({})",
                inline_texts.len(),
                main_resource.request_id,
                main_resource.url
            );
            inline.extend(inline_texts.into_iter().map(|code| ScriptArtifact {
                code,
                request_id: main_resource.request_id.clone(),
            }));
        }

        let external = self.external_scripts(load).await;

        Ok(CollectedScripts { inline, external })
    }

    /// Run the inline enumeration in the page and normalise its result.
    async fn inline_script_texts(&self, pass: &PassContext<'_>) -> Result<Vec<String>> {
        let value = pass
            .executor
            .evaluate(
                PageFunction::InlineScriptTexts,
                EvaluateOptions {
                    use_isolation: true,
                },
            )
            .await?;

        let texts: Vec<String> =
            serde_json::from_value(value).map_err(GatherError::EvaluationResult)?;

        Ok(texts
            .into_iter()
            .filter_map(|text| {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect())
    }

    /// Fetch the body of every `Script` record, skipping the ones without content.
    async fn external_scripts(&self, load: &dyn NetworkRecordStore) -> Vec<ScriptArtifact> {
        let script_records: Vec<&NetworkRecord> =
            load.records().iter().filter(|r| r.is_script()).collect();

        trace!("Fetching {} script bodies", script_records.len());

        // `buffered` yields in input order regardless of completion order.
        let outcomes: Vec<(&NetworkRecord, BodyOutcome)> = stream::iter(script_records)
            .map(|record| async move {
                let outcome = BodyOutcome::from_fetch(load.get_body(&record.request_id).await);
                (record, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        outcomes
            .into_iter()
            .filter_map(|(record, outcome)| {
                match &outcome {
                    BodyOutcome::Empty => debug!("Skipping empty script body: {}", record.url),
                    BodyOutcome::Unavailable(reason) => {
                        debug!("Skipping script {} ({}): {}", record.request_id, record.url, reason)
                    }
                    BodyOutcome::Content(_) => {}
                }
                outcome.into_content().map(|code| ScriptArtifact {
                    code,
                    request_id: record.request_id.clone(),
                })
            })
            .collect()
    }
}

impl Default for ScriptCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// The record for the page URL itself, ignoring fragments.
pub fn find_main_resource<'a>(records: &'a [NetworkRecord], page_url: &str) -> Option<&'a NetworkRecord> {
    records
        .iter()
        .find(|record| equal_without_fragment(&record.url, page_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::PageExecutor;
    use crate::types::ResourceType;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Page fake that returns a canned value for the inline enumeration.
    struct FakePage {
        result: std::result::Result<Value, String>,
        calls: Mutex<Vec<EvaluateOptions>>,
    }

    impl FakePage {
        fn with_inline(texts: &[&str]) -> Self {
            Self {
                result: Ok(json!(texts)),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                result: Err(message.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageExecutor for FakePage {
        async fn evaluate(&self, function: PageFunction, options: EvaluateOptions) -> Result<Value> {
            assert_eq!(function, PageFunction::InlineScriptTexts);
            self.calls.lock().unwrap().push(options);
            self.result.clone().map_err(GatherError::Execution)
        }
    }

    enum FakeBody {
        Content(&'static str),
        NoContent,
        Fails,
        Delayed(&'static str, u64),
    }

    struct FakeNetwork {
        records: Vec<NetworkRecord>,
        bodies: HashMap<String, FakeBody>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeNetwork {
        fn new(records: Vec<NetworkRecord>) -> Self {
            Self {
                records,
                bodies: HashMap::new(),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn body(mut self, request_id: &str, body: FakeBody) -> Self {
            self.bodies.insert(request_id.to_string(), body);
            self
        }
    }

    #[async_trait]
    impl NetworkRecordStore for FakeNetwork {
        fn records(&self) -> &[NetworkRecord] {
            &self.records
        }

        async fn get_body(&self, request_id: &str) -> Result<Option<String>> {
            self.requested.lock().unwrap().push(request_id.to_string());
            match self.bodies.get(request_id) {
                Some(FakeBody::Content(body)) => Ok(Some(body.to_string())),
                Some(FakeBody::NoContent) => Ok(None),
                Some(FakeBody::Delayed(body, millis)) => {
                    tokio::time::sleep(Duration::from_millis(*millis)).await;
                    Ok(Some(body.to_string()))
                }
                Some(FakeBody::Fails) | None => Err(GatherError::BodyUnavailable {
                    request_id: request_id.to_string(),
                    reason: "No resource with given identifier found".to_string(),
                }),
            }
        }
    }

    fn document(id: &str, url: &str) -> NetworkRecord {
        NetworkRecord::new(id, url, ResourceType::Document)
    }

    fn script(id: &str, url: &str) -> NetworkRecord {
        NetworkRecord::new(id, url, ResourceType::Script)
    }

    fn artifact(code: &str, request_id: &str) -> ScriptArtifact {
        ScriptArtifact {
            code: code.to_string(),
            request_id: request_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_inline_script_attributed_to_main_document() {
        let page = FakePage::with_inline(&["console.log(1)"]);
        let network = FakeNetwork::new(vec![document("1", "https://x/")]);
        let pass = PassContext::new("https://x/", &page);

        let scripts = ScriptCollector::new().collect(&pass, &network).await.unwrap();

        assert_eq!(scripts, vec![artifact("console.log(1)", "1")]);
        assert_eq!(
            page.calls.lock().unwrap().as_slice(),
            &[EvaluateOptions { use_isolation: true }]
        );
    }

    #[tokio::test]
    async fn test_failed_body_is_skipped() {
        let page = FakePage::with_inline(&[]);
        let network = FakeNetwork::new(vec![
            script("2", "https://x/a.js"),
            script("3", "https://x/b.js"),
        ])
        .body("2", FakeBody::Content("var a=1"))
        .body("3", FakeBody::Fails);
        let pass = PassContext::new("https://x/", &page);

        let scripts = ScriptCollector::new().collect(&pass, &network).await.unwrap();

        assert_eq!(scripts, vec![artifact("var a=1", "2")]);
        assert_eq!(*network.requested.lock().unwrap(), vec!["2", "3"]);
    }

    #[tokio::test]
    async fn test_missing_main_resource_is_fatal() {
        let page = FakePage::with_inline(&["init()"]);
        let network = FakeNetwork::new(vec![
            document("1", "https://other/"),
            script("2", "https://x/a.js"),
        ])
        .body("2", FakeBody::Content("var a=1"));
        let pass = PassContext::new("https://x/", &page);

        let err = ScriptCollector::new().collect(&pass, &network).await.unwrap_err();

        assert!(matches!(err, GatherError::MainResourceNotFound { ref url } if url == "https://x/"));
        assert!(network.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_main_resource_needed_without_inline_scripts() {
        let page = FakePage::with_inline(&[]);
        let network =
            FakeNetwork::new(vec![script("2", "https://cdn/a.js")]).body("2", FakeBody::Content("a()"));
        let pass = PassContext::new("https://x/", &page);

        let scripts = ScriptCollector::new().collect(&pass, &network).await.unwrap();

        assert_eq!(scripts, vec![artifact("a()", "2")]);
    }

    #[tokio::test]
    async fn test_execution_failure_is_fatal() {
        let page = FakePage::failing("Execution context was destroyed");
        let network =
            FakeNetwork::new(vec![script("2", "https://x/a.js")]).body("2", FakeBody::Content("a()"));
        let pass = PassContext::new("https://x/", &page);

        let err = ScriptCollector::new().collect(&pass, &network).await.unwrap_err();

        assert!(matches!(err, GatherError::Execution(_)));
        assert!(network.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_evaluation_shape_is_fatal() {
        let page = FakePage {
            result: Ok(json!({"scripts": 1})),
            calls: Mutex::new(Vec::new()),
        };
        let network = FakeNetwork::new(vec![document("1", "https://x/")]);
        let pass = PassContext::new("https://x/", &page);

        let err = ScriptCollector::new().collect(&pass, &network).await.unwrap_err();

        assert!(matches!(err, GatherError::EvaluationResult(_)));
    }

    #[tokio::test]
    async fn test_blank_inline_text_never_produces_artifact() {
        let page = FakePage::with_inline(&["", "   \n\t", "  run()  "]);
        let network = FakeNetwork::new(vec![document("1", "https://x/")]);
        let pass = PassContext::new("https://x/", &page);

        let scripts = ScriptCollector::new().collect(&pass, &network).await.unwrap();

        assert_eq!(scripts, vec![artifact("run()", "1")]);
    }

    #[tokio::test]
    async fn test_only_blank_inline_text_skips_attribution() {
        let page = FakePage::with_inline(&["  "]);
        let network = FakeNetwork::new(Vec::new());
        let pass = PassContext::new("https://x/", &page);

        let scripts = ScriptCollector::new().collect(&pass, &network).await.unwrap();

        assert!(scripts.is_empty());
    }

    #[tokio::test]
    async fn test_main_resource_matched_without_fragment() {
        let page = FakePage::with_inline(&["a()"]);
        let network = FakeNetwork::new(vec![
            script("0", "https://x/pre.js"),
            document("1", "https://x/page"),
        ])
        .body("0", FakeBody::Content("pre()"));
        let pass = PassContext::new("https://x/page#section", &page);

        let scripts = ScriptCollector::new().collect(&pass, &network).await.unwrap();

        assert_eq!(scripts, vec![artifact("a()", "1"), artifact("pre()", "0")]);
    }

    #[tokio::test]
    async fn test_inline_before_external_in_record_order() {
        let page = FakePage::with_inline(&["first()", "second()"]);
        let network = FakeNetwork::new(vec![
            document("1", "https://x/"),
            script("2", "https://x/a.js"),
            NetworkRecord::new("3", "https://x/style.css", ResourceType::Stylesheet),
            script("4", "https://x/b.js"),
            script("5", "https://x/c.js"),
            script("6", "https://x/d.js"),
        ])
        .body("2", FakeBody::Content("a"))
        .body("3", FakeBody::Content("body{}"))
        .body("4", FakeBody::NoContent)
        .body("5", FakeBody::Fails)
        .body("6", FakeBody::Content("d"));
        let pass = PassContext::new("https://x/", &page);

        let scripts = ScriptCollector::new().collect(&pass, &network).await.unwrap();

        assert_eq!(
            scripts,
            vec![
                artifact("first()", "1"),
                artifact("second()", "1"),
                artifact("a", "2"),
                artifact("d", "6"),
            ]
        );
        // Non-script records are never fetched.
        assert_eq!(*network.requested.lock().unwrap(), vec!["2", "4", "5", "6"]);
    }

    #[tokio::test]
    async fn test_concurrent_retrieval_keeps_record_order() {
        let page = FakePage::with_inline(&["inline()"]);
        let network = FakeNetwork::new(vec![
            document("1", "https://x/"),
            script("2", "https://x/slow.js"),
            script("3", "https://x/broken.js"),
            script("4", "https://x/fast.js"),
        ])
        .body("2", FakeBody::Delayed("slow", 50))
        .body("3", FakeBody::Fails)
        .body("4", FakeBody::Delayed("fast", 1));
        let pass = PassContext::new("https://x/", &page);

        let collected = ScriptCollector::new()
            .with_concurrency(8)
            .collect_detailed(&pass, &network)
            .await
            .unwrap();

        assert_eq!(collected.inline, vec![artifact("inline()", "1")]);
        assert_eq!(collected.external, vec![artifact("slow", "2"), artifact("fast", "4")]);
    }

    #[tokio::test]
    async fn test_declared_classification_followed_verbatim() {
        let page = FakePage::with_inline(&[]);
        let network = FakeNetwork::new(vec![
            NetworkRecord::new("2", "https://x/app.js", ResourceType::Fetch),
            script("3", "https://x/data.json"),
        ])
        .body("2", FakeBody::Content("app()"))
        .body("3", FakeBody::Content("{\"a\":1}"));
        let pass = PassContext::new("https://x/", &page);

        let scripts = ScriptCollector::new().collect(&pass, &network).await.unwrap();

        assert_eq!(scripts, vec![artifact("{\"a\":1}", "3")]);
    }

    #[tokio::test]
    async fn test_identical_bodies_not_deduplicated() {
        let page = FakePage::with_inline(&["same()", "same()"]);
        let network = FakeNetwork::new(vec![
            document("1", "https://x/"),
            script("2", "https://x/a.js"),
            script("3", "https://x/b.js"),
        ])
        .body("2", FakeBody::Content("same()"))
        .body("3", FakeBody::Content("same()"));
        let pass = PassContext::new("https://x/", &page);

        let scripts = ScriptCollector::new().collect(&pass, &network).await.unwrap();

        assert_eq!(scripts.len(), 4);
    }

    #[test]
    fn test_find_main_resource_takes_first_match() {
        let records = vec![
            script("0", "https://x/a.js"),
            document("1", "https://x/#a"),
            document("2", "https://x/"),
        ];
        let main = find_main_resource(&records, "https://x/").unwrap();
        assert_eq!(main.request_id, "1");
        assert!(find_main_resource(&records, "https://y/").is_none());
    }
}
