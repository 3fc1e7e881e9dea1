//! Edge and client configuration
//!
//! Edge settings come from the host's `env` object; client settings from the
//! options object handed to `init_fingerprinting`. Both fall back to
//! defaults field by field.

use js_sys::Object;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wasm_bindgen::{JsCast, JsValue};

use crate::browser;

/// Retention of raw fingerprint records and IP index entries (90 days)
pub const RECORD_TTL_SECS: u64 = 60 * 60 * 24 * 90;

/// Retention of rolling visitor profiles (1 year)
pub const PROFILE_TTL_SECS: u64 = 60 * 60 * 24 * 365;

/// Number of visits kept in a visitor profile
pub const MAX_PROFILE_VISITS: usize = 100;

/// Page size of the admin listing when the caller gives none
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Edge function settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Bearer secret for the admin listing and config update endpoints
    #[serde(rename = "CONFIG_PASSWORD")]
    pub admin_secret: String,

    /// Webhook of the external aggregation service
    #[serde(rename = "RELAY_URL")]
    pub relay_url: Option<String>,

    /// Source tag attached to relayed events
    #[serde(rename = "RELAY_SOURCE")]
    pub relay_source: String,

    /// Name of the KV binding holding fingerprint data
    #[serde(rename = "FINGERPRINT_BINDING")]
    pub fingerprint_binding: String,

    /// Name of the KV binding holding the site configuration
    #[serde(rename = "CONFIG_BINDING")]
    pub config_binding: String,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            admin_secret: "admin123".to_string(),
            relay_url: None,
            relay_source: "paint.toth.ink".to_string(),
            fingerprint_binding: "FINGERPRINT_DATA".to_string(),
            config_binding: "SITE_CONFIG".to_string(),
        }
    }
}

impl EdgeConfig {
    /// Read settings from the host `env` object
    ///
    /// Only string-valued entries are considered, so KV bindings and other
    /// objects on `env` are skipped. A malformed env falls back to the
    /// defaults.
    pub fn from_env(env: &JsValue) -> Self {
        if !env.is_object() {
            return Self::default();
        }
        let vars: Map<String, Value> = Object::keys(env.unchecked_ref::<Object>())
            .iter()
            .filter_map(|key| {
                let name = key.as_string()?;
                let value = browser::prop_string(env, &name)?;
                Some((name, Value::String(value)))
            })
            .collect();

        serde_json::from_value(Value::Object(vars)).unwrap_or_else(|e| {
            log::warn!("Invalid edge env, using defaults: {}", e);
            Self::default()
        })
    }

    /// Relay URL if relaying is enabled (blank counts as disabled)
    pub fn relay_target(&self) -> Option<&str> {
        self.relay_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Browser-side collection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Collection endpoint the record is posted to
    pub endpoint: String,
    /// Lower bound of the delay between page load and collection
    pub send_delay_min_ms: u32,
    /// Upper bound of the delay between page load and collection
    pub send_delay_max_ms: u32,
    /// Lower bound of the jitter before the probes start
    pub collect_jitter_min_ms: u32,
    /// Upper bound of the jitter before the probes start
    pub collect_jitter_max_ms: u32,
    /// Time the audio graph runs before the analyser is sampled
    pub audio_sample_ms: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "/api/fingerprint".to_string(),
            send_delay_min_ms: 1000,
            send_delay_max_ms: 3000,
            collect_jitter_min_ms: 100,
            collect_jitter_max_ms: 400,
            audio_sample_ms: 50,
        }
    }
}

impl ClientConfig {
    pub fn from_js(options: JsValue) -> Self {
        if options.is_undefined() || options.is_null() {
            Self::default()
        } else {
            serde_wasm_bindgen::from_value(options).unwrap_or_default()
        }
    }
}
