// Forwarding of ingested events to the external aggregation service
//
// Dispatch is a synchronous hand-off: the relay builds the POST as a
// background task and returns it without polling it, so the ingestion
// response never waits on the remote service. The caller queues the task on
// the context and the host entry point keeps it alive past the response.
// Failures are logged in the task and go nowhere else.

use std::cell::RefCell;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::browser;
use crate::config::EdgeConfig;
use crate::error::{FingerprintError, Result};

/// Work that must outlive the response it was started for
pub type BackgroundTask = LocalBoxFuture<'static, ()>;

/// Envelope posted to the aggregation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEvent {
    /// Static tag identifying this deployment
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl RelayEvent {
    pub fn new<T: Serialize>(source: &str, kind: &str, data: &T) -> Result<Self> {
        Ok(Self {
            source: source.to_string(),
            kind: kind.to_string(),
            data: serde_json::to_value(data)
                .map_err(|e| FingerprintError::Internal(e.to_string()))?,
        })
    }
}

pub trait EventRelay {
    /// Hand off `event`; any network work comes back as an unpolled task
    fn dispatch(&self, event: RelayEvent) -> Option<BackgroundTask>;
}

/// Relay used when no webhook is configured
#[derive(Debug, Default)]
pub struct NoopRelay;

impl EventRelay for NoopRelay {
    fn dispatch(&self, _event: RelayEvent) -> Option<BackgroundTask> {
        None
    }
}

/// Posts events as JSON through the global `fetch`
#[derive(Debug, Clone)]
pub struct FetchRelay {
    url: String,
}

impl FetchRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl EventRelay for FetchRelay {
    fn dispatch(&self, event: RelayEvent) -> Option<BackgroundTask> {
        let body = match serde_json::to_string(&event) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Relay event not serializable: {}", e);
                return None;
            }
        };
        let url = self.url.clone();
        Some(
            async move {
                if let Err(e) = post(&url, &body).await {
                    log::warn!("Relay to {} failed: {}", url, e);
                }
            }
            .boxed_local(),
        )
    }
}

async fn post(url: &str, body: &str) -> Result<()> {
    let request = browser::json_post(url, body, false)?;
    let response = browser::global_fetch(&request).await?;
    if response.ok() {
        Ok(())
    } else {
        Err(FingerprintError::Network(format!(
            "relay answered {}",
            response.status()
        )))
    }
}

/// Records events in memory
#[derive(Debug, Default)]
pub struct MemoryRelay {
    events: RefCell<Vec<RelayEvent>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RelayEvent> {
        self.events.borrow().clone()
    }
}

impl EventRelay for MemoryRelay {
    fn dispatch(&self, event: RelayEvent) -> Option<BackgroundTask> {
        self.events.borrow_mut().push(event);
        None
    }
}

/// Relay matching the configuration: webhook if `RELAY_URL` is set,
/// otherwise nothing
pub fn relay_for(config: &EdgeConfig) -> Rc<dyn EventRelay> {
    match config.relay_target() {
        Some(url) => Rc::new(FetchRelay::new(url)),
        None => Rc::new(NoopRelay),
    }
}
