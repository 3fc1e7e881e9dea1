// Fingerprint ingestion: POST /api/fingerprint
//
// receive -> check method -> enrich -> persist -> relay -> respond
//
// Persistence writes three keys per request, independently and without a
// transaction:
//   fp:<visitorId>:<timestamp>   enriched record          (90 days)
//   visitor:<visitorId>          rolling profile (RMW)    (1 year)
//   ip:<ip>:<visitorId>          timestamp of the sighting (90 days)
//
// A failed write is logged and does not undo or skip the other two.
// Concurrent requests for one visitor race on the profile; the last put
// wins.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{EdgeContext, EdgeRequest, EdgeResponse, RelayEvent, INGEST_CORS};
use crate::config::{MAX_PROFILE_VISITS, PROFILE_TTL_SECS, RECORD_TTL_SECS};
use crate::error::{FingerprintError, Result};
use crate::runtime;
use crate::storage::{KvNamespace, PutOptions};

/// Key of one immutable enriched record
pub fn fingerprint_key(visitor_id: &str, timestamp: &str) -> String {
    format!("fp:{}:{}", visitor_id, timestamp)
}

/// Key of a visitor's rolling profile
pub fn profile_key(visitor_id: &str) -> String {
    format!("visitor:{}", visitor_id)
}

/// Key of the network-origin index entry
pub fn ip_index_key(ip: Option<&str>, visitor_id: &str) -> String {
    format!("ip:{}:{}", ip.unwrap_or("unknown"), visitor_id)
}

/// Connection-level signals taken from the transport, never from the body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<u64>,
    /// Operator of the autonomous system
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_protocol: Option<String>,
}

impl ServerSignals {
    pub fn from_request(req: &EdgeRequest) -> Self {
        let header = |name: &str| req.header(name).map(str::to_string);
        Self {
            ip: header("cf-connecting-ip"),
            country: header("cf-ipcountry"),
            city: req.cf_str("city"),
            region: req.cf_str("region"),
            asn: req.cf.get("asn").and_then(Value::as_u64),
            isp: req.cf_str("asOrganization"),
            user_agent: header("user-agent"),
            accept_language: header("accept-language"),
            referer: header("referer"),
            timezone: req.cf_str("timezone"),
            is_bot: req.cf.get("isBot").and_then(Value::as_bool),
            tls_version: req.cf_str("tlsVersion"),
            http_protocol: req.cf_str("httpProtocol"),
        }
    }
}

/// Headers kept verbatim for manual inspection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSignals {
    pub ip: Option<String>,
    pub ua: Option<String>,
    pub lang: Option<String>,
}

/// Submitted record plus server signals, as persisted under `fp:`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    pub visitor_id: String,
    pub timestamp: String,
    pub server_signals: ServerSignals,
    /// The client's `components`, or `{}` when it sent none
    pub client_signals: Value,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Page from the body, else the Referer
    pub page: Option<String>,
    pub raw: RawSignals,
}

impl EnrichedRecord {
    /// Merge a parsed request body with the server's view of the request
    ///
    /// Missing or empty visitor ids are replaced by a fresh random one, so
    /// every accepted request yields a record.
    pub fn from_submission(body: &Value, server: ServerSignals, timestamp: String) -> Self {
        let text = |field: &str| {
            body.get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let client_signals = match body.get("components") {
            Some(components) if is_truthy(components) => components.clone(),
            _ => json!({}),
        };

        Self {
            visitor_id: text("visitorId").unwrap_or_else(runtime::uuid_v4),
            timestamp,
            client_signals,
            confidence: body
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            session_id: text("sessionId"),
            page: text("page").or_else(|| server.referer.clone()),
            raw: RawSignals {
                ip: server.ip.clone(),
                ua: server.user_agent.clone(),
                lang: server.accept_language.clone(),
            },
            server_signals: server,
        }
    }

    fn visit(&self) -> Visit {
        Visit {
            timestamp: self.timestamp.clone(),
            ip: self.server_signals.ip.clone(),
            country: self.server_signals.country.clone(),
            page: self.page.clone(),
        }
    }

    /// Client signals overlaid with server signals (server wins on
    /// conflicting names)
    fn merged_snapshot(&self) -> Value {
        let mut merged = match &self.client_signals {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        if let Ok(Value::Object(server)) = serde_json::to_value(&self.server_signals) {
            merged.extend(server);
        }
        Value::Object(merged)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// One sighting in a visitor profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub timestamp: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
}

/// Rolling per-visitor summary stored under `visitor:`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorProfile {
    #[serde(default)]
    pub last_seen: Option<String>,
    /// Oldest first, at most `MAX_PROFILE_VISITS`
    #[serde(default)]
    pub visits: Vec<Visit>,
    /// Last merged client + server snapshot
    #[serde(default)]
    pub fingerprint: Value,
}

impl VisitorProfile {
    /// Append a visit, evicting the oldest beyond `cap`
    pub fn record_visit(&mut self, visit: Visit, cap: usize) {
        self.last_seen = Some(visit.timestamp.clone());
        self.visits.push(visit);
        if self.visits.len() > cap {
            let excess = self.visits.len() - cap;
            self.visits.drain(..excess);
        }
    }
}

pub(super) async fn handle(ctx: &EdgeContext, req: &EdgeRequest) -> EdgeResponse {
    match req.method.as_str() {
        "OPTIONS" => return EdgeResponse::preflight(&INGEST_CORS),
        "POST" => {}
        other => {
            return EdgeResponse::error(
                &FingerprintError::MethodNotAllowed(other.to_string()),
                &INGEST_CORS,
            )
        }
    }

    match ingest(ctx, req).await {
        Ok(visitor_id) => EdgeResponse::json(
            200,
            &json!({ "success": true, "visitorId": visitor_id }),
            &INGEST_CORS,
        ),
        Err(e) => {
            log::error!("Fingerprint collection error: {}", e);
            EdgeResponse::error(&e, &INGEST_CORS)
        }
    }
}

async fn ingest(ctx: &EdgeContext, req: &EdgeRequest) -> Result<String> {
    let body: Value = serde_json::from_str(req.body.as_deref().unwrap_or_default())?;
    if body.is_null() {
        return Err(FingerprintError::InvalidBody("null body".into()));
    }

    let record = EnrichedRecord::from_submission(
        &body,
        ServerSignals::from_request(req),
        ctx.clock.now_iso(),
    );

    match ctx.fingerprints.as_deref() {
        Some(kv) => persist(kv, &record).await?,
        None => log::warn!("Fingerprint namespace not bound, record not stored"),
    }

    if ctx.config.relay_target().is_some() {
        let event = RelayEvent::new(&ctx.config.relay_source, "fingerprint", &record)?;
        if let Some(task) = ctx.relay.dispatch(event) {
            ctx.background.defer(task);
        }
    }

    Ok(record.visitor_id)
}

/// Run all three writes; report the first failure after all have run
async fn persist(kv: &dyn KvNamespace, record: &EnrichedRecord) -> Result<()> {
    let outcomes = [
        ("record", store_record(kv, record).await),
        ("profile", update_profile(kv, record).await),
        ("ip index", store_ip_index(kv, record).await),
    ];

    let mut first_error = None;
    for (what, outcome) in outcomes {
        if let Err(e) = outcome {
            log::error!("Failed to write {} for {}: {}", what, record.visitor_id, e);
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

async fn store_record(kv: &dyn KvNamespace, record: &EnrichedRecord) -> Result<()> {
    let body = serde_json::to_string(record)
        .map_err(|e| FingerprintError::Internal(e.to_string()))?;
    kv.put(
        &fingerprint_key(&record.visitor_id, &record.timestamp),
        &body,
        PutOptions::ttl(RECORD_TTL_SECS),
    )
    .await
}

async fn update_profile(kv: &dyn KvNamespace, record: &EnrichedRecord) -> Result<()> {
    let key = profile_key(&record.visitor_id);
    let mut profile = match kv.get(&key).await? {
        Some(stored) => serde_json::from_str(&stored).unwrap_or_else(|e| {
            log::warn!("Unreadable profile {}, starting fresh: {}", key, e);
            VisitorProfile::default()
        }),
        None => VisitorProfile::default(),
    };

    profile.record_visit(record.visit(), MAX_PROFILE_VISITS);
    profile.fingerprint = record.merged_snapshot();

    let body = serde_json::to_string(&profile)
        .map_err(|e| FingerprintError::Internal(e.to_string()))?;
    kv.put(&key, &body, PutOptions::ttl(PROFILE_TTL_SECS)).await
}

async fn store_ip_index(kv: &dyn KvNamespace, record: &EnrichedRecord) -> Result<()> {
    kv.put(
        &ip_index_key(record.server_signals.ip.as_deref(), &record.visitor_id),
        &record.timestamp,
        PutOptions::ttl(RECORD_TTL_SECS),
    )
    .await
}
