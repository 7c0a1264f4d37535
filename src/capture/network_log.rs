//! Network activity recording and cached body retrieval over CDP.

use crate::capability::NetworkRecordStore;
use crate::types::{GatherError, NetworkRecord, ResourceType, Result};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::network::{
    GetResponseBodyParams, RequestId, ResourceType as CdpResourceType,
};
use chromiumoxide::Page;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::trace;

/// Map a CDP resource type onto the types the collector understands.
pub fn resource_type_from_cdp(resource_type: &CdpResourceType) -> ResourceType {
    match resource_type {
        CdpResourceType::Document => ResourceType::Document,
        CdpResourceType::Stylesheet => ResourceType::Stylesheet,
        CdpResourceType::Image => ResourceType::Image,
        CdpResourceType::Media => ResourceType::Media,
        CdpResourceType::Font => ResourceType::Font,
        CdpResourceType::Script => ResourceType::Script,
        CdpResourceType::TextTrack => ResourceType::TextTrack,
        CdpResourceType::Xhr => ResourceType::Xhr,
        CdpResourceType::Fetch => ResourceType::Fetch,
        CdpResourceType::EventSource => ResourceType::EventSource,
        CdpResourceType::WebSocket => ResourceType::WebSocket,
        CdpResourceType::Manifest => ResourceType::Manifest,
        CdpResourceType::Ping => ResourceType::Ping,
        CdpResourceType::Preflight => ResourceType::Preflight,
        _ => ResourceType::Other,
    }
}

#[derive(Debug, Clone)]
struct Entry {
    request_id: String,
    url: String,
    resource_type: Option<ResourceType>,
}

#[derive(Debug, Default)]
struct RecordBook {
    entries: Vec<Entry>,
    by_id: HashMap<String, usize>,
    /// Types from responses whose request event has not been seen yet.
    early_types: HashMap<String, ResourceType>,
    /// URL of the last cross-document navigation of the main frame.
    document_url: Option<String>,
}

/// Accumulates network records from browser events.
///
/// Only request events create records, so record order is request order no
/// matter how request and response events interleave.
#[derive(Debug, Clone, Default)]
pub struct NetworkRecorder {
    book: Arc<Mutex<RecordBook>>,
}

impl NetworkRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request is about to be sent. A repeated id is a redirect hop: the URL moves on.
    pub async fn on_request(&self, request_id: &str, url: &str, resource_type: Option<ResourceType>) {
        let mut book = self.book.lock().await;
        if let Some(idx) = book.by_id.get(request_id).copied() {
            let entry = &mut book.entries[idx];
            trace!("Redirect {} -> {}", entry.url, url);
            entry.url = url.to_string();
            if resource_type.is_some() {
                entry.resource_type = resource_type;
            }
            return;
        }

        let resource_type = resource_type.or_else(|| book.early_types.remove(request_id));
        let idx = book.entries.len();
        book.entries.push(Entry {
            request_id: request_id.to_string(),
            url: url.to_string(),
            resource_type,
        });
        book.by_id.insert(request_id.to_string(), idx);
    }

    /// A response arrived. Fills in the type when the request did not declare one.
    pub async fn on_response(&self, request_id: &str, resource_type: ResourceType) {
        let mut book = self.book.lock().await;
        match book.by_id.get(request_id).copied() {
            Some(idx) => {
                book.entries[idx].resource_type.get_or_insert(resource_type);
            }
            None => {
                book.early_types
                    .entry(request_id.to_string())
                    .or_insert(resource_type);
            }
        }
    }

    /// The main frame committed a new document. `about:` pages are ignored.
    pub async fn on_main_frame_navigated(&self, url: &str) {
        if url.starts_with("about:") {
            return;
        }
        self.book.lock().await.document_url = Some(url.to_string());
    }

    /// URL of the document the main frame settled on, unaffected by
    /// `history.pushState`/`replaceState` done by page scripts.
    pub async fn document_url(&self) -> Option<String> {
        self.book.lock().await.document_url.clone()
    }

    pub async fn len(&self) -> usize {
        self.book.lock().await.entries.len()
    }

    /// Records observed so far, in request order.
    pub async fn snapshot(&self) -> Vec<NetworkRecord> {
        self.book
            .lock()
            .await
            .entries
            .iter()
            .map(|entry| NetworkRecord {
                request_id: entry.request_id.clone(),
                url: entry.url.clone(),
                resource_type: entry.resource_type.unwrap_or(ResourceType::Other),
            })
            .collect()
    }
}

/// Records of a finished load, with bodies served from the page's network cache.
pub struct ChromeNetworkLog {
    page: Page,
    records: Vec<NetworkRecord>,
}

impl ChromeNetworkLog {
    pub fn new(page: Page, records: Vec<NetworkRecord>) -> Self {
        Self { page, records }
    }
}

#[async_trait]
impl NetworkRecordStore for ChromeNetworkLog {
    fn records(&self) -> &[NetworkRecord] {
        &self.records
    }

    async fn get_body(&self, request_id: &str) -> Result<Option<String>> {
        let body = self
            .page
            .execute(GetResponseBodyParams::new(RequestId::new(request_id)))
            .await
            .map_err(|e| GatherError::BodyUnavailable {
                request_id: request_id.to_string(),
                reason: e.to_string(),
            })?;

        let content = decode_body(&body.body, body.base64_encoded).map_err(|reason| {
            GatherError::BodyUnavailable {
                request_id: request_id.to_string(),
                reason,
            }
        })?;

        Ok((!content.is_empty()).then_some(content))
    }
}

/// Decode a `Network.getResponseBody` payload into text.
pub fn decode_body(body: &str, base64_encoded: bool) -> std::result::Result<String, String> {
    if !base64_encoded {
        return Ok(body.to_string());
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| format!("invalid base64 body: {}", e))?;
    Ok(String::from_utf8_lossy(&decoded).to_string())
}
