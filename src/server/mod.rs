// Edge endpoints
//
// Host-neutral request handling for the three API surfaces:
// - POST /api/fingerprint          ingestion (ingest.rs)
// - GET  /api/fingerprint/list     admin listing (list.rs)
// - GET  /api/config[/get]         site config read + status (config.rs)
// - PUT  /api/config/update        site config write (config.rs)
//
// Handlers take an `EdgeRequest` and an `EdgeContext` and never fail: every
// error is turned into a JSON `{"error": ...}` body with the endpoint's CORS
// headers. The wasm entry point in `edge.rs` converts to and from the host's
// Request/Response objects.

pub mod auth;
mod config;
mod ingest;
mod list;
mod relay;

pub use config::{default_site_config, ConfigCache, CONFIG_CACHE_TTL_MS, CONFIG_KEY};
pub use ingest::{
    fingerprint_key, ip_index_key, profile_key, EnrichedRecord, RawSignals, ServerSignals, Visit,
    VisitorProfile,
};
pub use list::{ListedVisitor, VisitorPage};
pub use relay::{
    relay_for, BackgroundTask, EventRelay, FetchRelay, MemoryRelay, NoopRelay, RelayEvent,
};

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::EdgeConfig;
use crate::error::{FingerprintError, Result};
use crate::runtime::{Clock, SystemClock};
use crate::storage::KvNamespace;

/// Fallback body when a response cannot be serialized
const INTERNAL_ERROR_BODY: &str = r#"{"error":"Internal error"}"#;

/// An incoming HTTP request, detached from the host runtime
#[derive(Debug, Clone, Default)]
pub struct EdgeRequest {
    pub method: String,
    pub url: String,
    /// Header names are stored lowercased
    headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Host connection metadata (geo, ASN, TLS), `Null` when absent
    pub cf: Value,
}

impl EdgeRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_cf(mut self, cf: Value) -> Self {
        self.cf = cf;
        self
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Header value, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// String field of the `cf` metadata object
    pub fn cf_str(&self, field: &str) -> Option<String> {
        self.cf.get(field).and_then(Value::as_str).map(str::to_string)
    }

    /// Path component of the URL (absolute or origin-relative)
    pub fn path(&self) -> &str {
        let rest = match self.url.find("://") {
            Some(scheme_end) => {
                let after = &self.url[scheme_end + 3..];
                match after.find('/') {
                    Some(slash) => &after[slash..],
                    None => "/",
                }
            }
            None => self.url.as_str(),
        };
        let end = rest.find(|c| c == '?' || c == '#').unwrap_or(rest.len());
        match &rest[..end] {
            "" => "/",
            path => path,
        }
    }

    /// First value of query parameter `name`, percent-decoded
    pub fn query(&self, name: &str) -> Option<String> {
        let (_, query) = self.url.split_once('?')?;
        let query = query.split('#').next().unwrap_or_default();
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .find(|(key, _)| decode_component(key) == name)
            .map(|(_, value)| decode_component(value))
    }
}

/// Decode `application/x-www-form-urlencoded` text; malformed escapes pass
/// through unchanged.
fn decode_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match hex::decode(&bytes[i + 1..i + 3]) {
                    Ok(decoded) => {
                        out.extend_from_slice(&decoded);
                        i += 3;
                        continue;
                    }
                    Err(_) => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// CORS policy of one endpoint
#[derive(Debug, Clone, Copy)]
pub struct Cors {
    pub allow_methods: &'static str,
    pub allow_headers: Option<&'static str>,
    pub max_age: Option<&'static str>,
}

impl Cors {
    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
            (
                "Access-Control-Allow-Methods".to_string(),
                self.allow_methods.to_string(),
            ),
        ];
        if let Some(allow) = self.allow_headers {
            headers.push(("Access-Control-Allow-Headers".to_string(), allow.to_string()));
        }
        if let Some(max_age) = self.max_age {
            headers.push(("Access-Control-Max-Age".to_string(), max_age.to_string()));
        }
        headers
    }
}

pub const INGEST_CORS: Cors = Cors {
    allow_methods: "POST, OPTIONS",
    allow_headers: Some("Content-Type"),
    max_age: Some("86400"),
};

pub const LIST_CORS: Cors = Cors {
    allow_methods: "GET, OPTIONS",
    allow_headers: Some("Content-Type, Authorization"),
    max_age: None,
};

pub const CONFIG_CORS: Cors = Cors {
    allow_methods: "GET, PUT, OPTIONS",
    allow_headers: Some("Content-Type, Authorization"),
    max_age: None,
};

pub const STATUS_CORS: Cors = Cors {
    allow_methods: "GET, OPTIONS",
    allow_headers: None,
    max_age: None,
};

/// An outgoing HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// `None` is an empty (null) body
    pub body: Option<String>,
}

impl EdgeResponse {
    /// Preflight answer: 200, CORS headers, no body
    pub fn preflight(cors: &Cors) -> Self {
        Self {
            status: 200,
            headers: cors.headers(),
            body: None,
        }
    }

    /// JSON body that is already serialized
    pub fn raw_json(status: u16, body: String, cors: &Cors) -> Self {
        Self {
            status,
            headers: cors.headers(),
            body: Some(body),
        }
        .with_header("Content-Type", "application/json")
    }

    pub fn json<T: Serialize>(status: u16, value: &T, cors: &Cors) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::raw_json(status, body, cors),
            Err(e) => {
                log::error!("Response serialization failed: {}", e);
                Self::raw_json(500, INTERNAL_ERROR_BODY.to_string(), cors)
            }
        }
    }

    /// `{"error": <public message>}` with the error's status
    pub fn error(err: &FingerprintError, cors: &Cors) -> Self {
        Self::json(err.status(), &json!({ "error": err.public_message() }), cors)
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            headers: Vec::new(),
            body: Some(json!({ "error": "Not found" }).to_string()),
        }
        .with_header("Content-Type", "application/json")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Header value, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON
    pub fn json_body(&self) -> Result<Value> {
        let body = self
            .body
            .as_deref()
            .ok_or_else(|| FingerprintError::InvalidBody("empty body".into()))?;
        Ok(serde_json::from_str(body)?)
    }
}

/// Tasks started by a handler that the host must keep alive after the
/// response is returned
#[derive(Default)]
pub struct BackgroundTasks {
    pending: RefCell<Vec<BackgroundTask>>,
}

impl BackgroundTasks {
    pub fn defer(&self, task: BackgroundTask) {
        self.pending.borrow_mut().push(task);
    }

    /// Remove and return every queued task
    pub fn take(&self) -> Vec<BackgroundTask> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}

/// Everything a handler needs besides the request
pub struct EdgeContext {
    pub config: EdgeConfig,
    /// Fingerprint namespace; `None` when the binding is missing
    pub fingerprints: Option<Rc<dyn KvNamespace>>,
    /// Site config namespace; `None` when the binding is missing
    pub site_config: Option<Rc<dyn KvNamespace>>,
    pub relay: Rc<dyn EventRelay>,
    pub clock: Rc<dyn Clock>,
    pub config_cache: ConfigCache,
    /// Filled by handlers, drained by the host entry point right after
    /// `route` returns
    pub background: BackgroundTasks,
}

impl EdgeContext {
    /// Context with no storage bindings, the configured relay and the
    /// system clock
    pub fn new(config: EdgeConfig) -> Self {
        let relay = relay_for(&config);
        Self {
            config,
            fingerprints: None,
            site_config: None,
            relay,
            clock: Rc::new(SystemClock),
            config_cache: ConfigCache::new(),
            background: BackgroundTasks::default(),
        }
    }

    pub fn with_fingerprints(mut self, kv: Rc<dyn KvNamespace>) -> Self {
        self.fingerprints = Some(kv);
        self
    }

    pub fn with_site_config(mut self, kv: Rc<dyn KvNamespace>) -> Self {
        self.site_config = Some(kv);
        self
    }

    pub fn with_relay(mut self, relay: Rc<dyn EventRelay>) -> Self {
        self.relay = relay;
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Request path with trailing slashes removed
fn endpoint_path(req: &EdgeRequest) -> &str {
    match req.path().trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// CORS policy of the endpoint serving `path`
fn cors_for(path: &str) -> Cors {
    match path {
        "/api/fingerprint/list" => LIST_CORS,
        "/api/config" => STATUS_CORS,
        _ if path.starts_with("/api/config/") => CONFIG_CORS,
        _ => INGEST_CORS,
    }
}

/// Answer for a request the host could not hand over (unreadable headers
/// or body): the generic JSON error with the target endpoint's CORS headers
pub fn unreadable_request(url: &str, err: &FingerprintError) -> EdgeResponse {
    let target = EdgeRequest::new("GET", url);
    log::error!("Unreadable request to {}: {}", endpoint_path(&target), err);
    EdgeResponse::error(err, &cors_for(endpoint_path(&target)))
}

/// Dispatch a request to its endpoint
pub async fn route(ctx: &EdgeContext, req: &EdgeRequest) -> EdgeResponse {
    let path = endpoint_path(req);
    log::debug!("{} {}", req.method, path);

    match path {
        "/api/fingerprint" => ingest::handle(ctx, req).await,
        "/api/fingerprint/list" => list::handle(ctx, req).await,
        "/api/config" => config::status(ctx, req),
        _ => match path.strip_prefix("/api/config/") {
            Some(action) if !action.contains('/') => config::handle(ctx, req, action).await,
            _ => EdgeResponse::not_found(),
        },
    }
}
