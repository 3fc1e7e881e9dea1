//! Identity synthesis
//!
//! Turns a set of collected fingerprint components into a stable visitor id
//! and a confidence score, and defines the record the browser submits.
//!
//! The visitor id is the first 32 hex characters of SHA-256 over the
//! canonical JSON of the components. Canonical means: top-level keys in
//! [`SignalKind`] declaration order, nested object keys sorted. Equal
//! component maps therefore always hash to the same id. The id is a
//! correlation key, not a token; the truncation is accepted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Length of the visitor id in hex characters
pub const VISITOR_ID_LEN: usize = 32;

/// One category of collected browser/environment signal
///
/// Declaration order is the canonical serialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalKind {
    Canvas,
    Webgl,
    Audio,
    Fonts,
    Screen,
    Navigator,
    Timezone,
    Touch,
    Storage,
}

impl SignalKind {
    pub const ALL: [SignalKind; 9] = [
        SignalKind::Canvas,
        SignalKind::Webgl,
        SignalKind::Audio,
        SignalKind::Fonts,
        SignalKind::Screen,
        SignalKind::Navigator,
        SignalKind::Timezone,
        SignalKind::Touch,
        SignalKind::Storage,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::Canvas => "canvas",
            SignalKind::Webgl => "webgl",
            SignalKind::Audio => "audio",
            SignalKind::Fonts => "fonts",
            SignalKind::Screen => "screen",
            SignalKind::Navigator => "navigator",
            SignalKind::Timezone => "timezone",
            SignalKind::Touch => "touch",
            SignalKind::Storage => "storage",
        }
    }
}

/// Collected components, keyed by signal kind
///
/// A kind mapped to `None` was probed and failed; it serializes as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintComponents(BTreeMap<SignalKind, Option<Value>>);

impl FingerprintComponents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one probe
    pub fn insert(&mut self, kind: SignalKind, value: Option<Value>) {
        self.0.insert(kind, value);
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, kind: SignalKind, value: Option<Value>) -> Self {
        self.insert(kind, value);
        self
    }

    /// Value of a successfully collected signal
    pub fn get(&self, kind: SignalKind) -> Option<&Value> {
        self.0.get(&kind).and_then(Option::as_ref)
    }

    /// Number of signals that produced a value
    pub fn collected_count(&self) -> usize {
        self.0.values().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical serialization fed to the hash
    pub fn canonical_json(&self) -> String {
        // BTreeMap keys serialize in enum order; serde_json objects are
        // BTreeMap-backed, so nested keys come out sorted.
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

/// Visitor id and confidence derived from a component set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub visitor_id: String,
    pub confidence: f64,
}

/// Derive the identity of a component set
pub fn synthesize(components: &FingerprintComponents) -> Identity {
    Identity {
        visitor_id: visitor_id(components),
        confidence: confidence(components),
    }
}

/// Truncated hex SHA-256 of the canonical component JSON
pub fn visitor_id(components: &FingerprintComponents) -> String {
    let digest = Sha256::digest(components.canonical_json().as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(VISITOR_ID_LEN);
    id
}

/// Weighted estimate of signal quality
///
/// The weights are kept literal; they happen to sum to 1.0 when every
/// condition holds.
pub fn confidence(components: &FingerprintComponents) -> f64 {
    let field = |kind: SignalKind, name: &str| components.get(kind).and_then(|v| v.get(name));

    let mut score = 0.0;
    if truthy(components.get(SignalKind::Canvas)) {
        score += 0.20;
    }
    if truthy(field(SignalKind::Webgl, "renderer")) {
        score += 0.20;
    }
    if truthy(components.get(SignalKind::Audio)) {
        score += 0.15;
    }
    if components
        .get(SignalKind::Fonts)
        .and_then(Value::as_array)
        .is_some_and(|fonts| fonts.len() > 5)
    {
        score += 0.15;
    }
    if truthy(field(SignalKind::Navigator, "userAgent")) {
        score += 0.10;
    }
    if truthy(field(SignalKind::Screen, "width")) {
        score += 0.10;
    }
    if truthy(field(SignalKind::Timezone, "timezone")) {
        score += 0.10;
    }
    score
}

/// JavaScript truthiness of an optional JSON value
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Record submitted by the browser once per collection cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintRecord {
    pub visitor_id: String,
    pub components: FingerprintComponents,
    pub confidence: f64,
    pub session_id: String,
    pub page: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
}

impl FingerprintRecord {
    /// Build the record for a successful collection
    pub fn assemble(
        components: FingerprintComponents,
        session_id: String,
        page: String,
        timestamp: String,
    ) -> Self {
        let identity = synthesize(&components);
        Self {
            visitor_id: identity.visitor_id,
            components,
            confidence: identity.confidence,
            session_id,
            page,
            timestamp,
            error: None,
        }
    }

    /// Minimal record for a collection that failed as a whole
    pub fn fallback(page: String, timestamp: String) -> Self {
        Self {
            visitor_id: crate::runtime::uuid_v4(),
            components: FingerprintComponents::new(),
            confidence: 0.0,
            session_id: crate::runtime::uuid_v4(),
            page,
            timestamp,
            error: Some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_components() -> FingerprintComponents {
        FingerprintComponents::new()
            .with(SignalKind::Canvas, Some(json!("data:image/png;base64,iVBORw0KGgo")))
            .with(
                SignalKind::Webgl,
                Some(json!({"vendor": "Google Inc.", "renderer": "ANGLE (Apple M1)", "version": "WebGL 1.0"})),
            )
            .with(SignalKind::Audio, Some(json!("4823")))
            .with(
                SignalKind::Fonts,
                Some(json!(["Arial", "Courier New", "Georgia", "Helvetica", "Menlo", "Monaco"])),
            )
            .with(SignalKind::Screen, Some(json!({"width": 1440, "height": 900})))
            .with(SignalKind::Navigator, Some(json!({"userAgent": "Mozilla/5.0"})))
            .with(SignalKind::Timezone, Some(json!({"timezone": "America/Los_Angeles"})))
            .with(SignalKind::Touch, Some(json!({"touchSupport": false})))
            .with(SignalKind::Storage, Some(json!({"localStorage": true})))
    }

    #[test]
    fn test_equal_components_equal_ids() {
        assert_eq!(visitor_id(&full_components()), visitor_id(&full_components()));
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let forward = FingerprintComponents::new()
            .with(SignalKind::Audio, Some(json!("12")))
            .with(SignalKind::Screen, Some(json!({"width": 1, "height": 2})));
        let backward = FingerprintComponents::new()
            .with(SignalKind::Screen, Some(json!({"height": 2, "width": 1})))
            .with(SignalKind::Audio, Some(json!("12")));
        assert_eq!(forward.canonical_json(), backward.canonical_json());
        assert_eq!(visitor_id(&forward), visitor_id(&backward));
    }

    #[test]
    fn test_canonical_key_order() {
        let components = FingerprintComponents::new()
            .with(SignalKind::Storage, None)
            .with(SignalKind::Canvas, Some(json!("x")));
        assert_eq!(components.canonical_json(), r#"{"canvas":"x","storage":null}"#);
    }

    #[test]
    fn test_different_components_different_ids() {
        let other = full_components().with(SignalKind::Audio, Some(json!("4824")));
        assert_ne!(visitor_id(&full_components()), visitor_id(&other));
    }

    #[test]
    fn test_visitor_id_shape() {
        let id = visitor_id(&FingerprintComponents::new());
        assert_eq!(id.len(), VISITOR_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // sha256("{}") = 44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a
        assert_eq!(id, "44136fa355b3678a1146ad16f7e8649e");
    }

    #[test]
    fn test_full_confidence() {
        let score = confidence(&full_components());
        assert!(score >= 0.9, "confidence {}", score);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_confidence_is_zero() {
        assert_eq!(confidence(&FingerprintComponents::new()), 0.0);
    }

    #[test]
    fn test_all_failed_confidence_is_zero() {
        let mut components = FingerprintComponents::new();
        for kind in SignalKind::ALL {
            components.insert(kind, None);
        }
        assert_eq!(components.collected_count(), 0);
        assert_eq!(confidence(&components), 0.0);
    }

    #[test]
    fn test_confidence_thresholds() {
        let few_fonts = FingerprintComponents::new()
            .with(SignalKind::Fonts, Some(json!(["Arial", "Verdana", "Tahoma", "Impact", "Menlo"])));
        assert_eq!(confidence(&few_fonts), 0.0);

        let webgl_without_renderer = FingerprintComponents::new()
            .with(SignalKind::Webgl, Some(json!({"vendor": null, "renderer": null})));
        assert_eq!(confidence(&webgl_without_renderer), 0.0);

        let zero_width = FingerprintComponents::new()
            .with(SignalKind::Screen, Some(json!({"width": 0})));
        assert_eq!(confidence(&zero_width), 0.0);

        let canvas_only = FingerprintComponents::new()
            .with(SignalKind::Canvas, Some(json!("data:,")));
        assert!((confidence(&canvas_only) - 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_record() {
        let record = FingerprintRecord::fallback("/about".into(), "2024-01-01T00:00:00.000Z".into());
        assert_eq!(record.confidence, 0.0);
        assert!(record.components.is_empty());
        assert_eq!(record.error, Some(true));
        assert_eq!(record.visitor_id.len(), 36);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["components"], json!({}));
        assert_eq!(json["error"], json!(true));
    }

    #[test]
    fn test_record_wire_names() {
        let record = FingerprintRecord::assemble(
            full_components(),
            "sid".into(),
            "/".into(),
            "2024-01-01T00:00:00.000Z".into(),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["visitorId"], json!(visitor_id(&full_components())));
        assert_eq!(json["sessionId"], json!("sid"));
        assert!(json.get("error").is_none());
        assert_eq!(json["components"]["webgl"]["renderer"], json!("ANGLE (Apple M1)"));
    }
}
