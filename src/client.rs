//! Browser-side pipeline: collect → synthesize → deliver
//!
//! ```javascript
//! import init, { initFingerprinting } from './pkg/visitor_fp.js';
//! await init();
//! initFingerprinting();                        // defaults
//! initFingerprinting({ endpoint: '/collect' }); // custom endpoint
//! ```
//!
//! None of these entry points can throw into the page or hold up its
//! rendering: collection starts after the `load` event plus a random delay,
//! and every failure degrades to "nothing sent".

use std::cell::Cell;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::Window;

use crate::browser;
use crate::collectors::{collect_components, default_sources};
use crate::config::ClientConfig;
use crate::error::{FingerprintError, Result};
use crate::identity::FingerprintRecord;
use crate::runtime::{self, Clock, SystemClock};
use crate::transport;

/// Session storage key holding the per-tab session id
const SESSION_KEY: &str = "_sid";

thread_local! {
    static SCHEDULED: Cell<bool> = const { Cell::new(false) };
}

/// Collect one fingerprint record
///
/// Never fails: if the pipeline breaks as a whole the record carries a
/// random visitor id, no components, confidence 0 and `error: true`.
pub async fn collect_fingerprint(config: &ClientConfig) -> FingerprintRecord {
    match try_collect(config).await {
        Ok(record) => record,
        Err(e) => {
            log::debug!("Fingerprint collection failed: {}", e);
            FingerprintRecord::fallback(current_page(), SystemClock.now_iso())
        }
    }
}

async fn try_collect(config: &ClientConfig) -> Result<FingerprintRecord> {
    let window = browser::window()?;

    runtime::sleep(runtime::jitter(
        config.collect_jitter_min_ms..=config.collect_jitter_max_ms,
    ))
    .await;

    let components = collect_components(&default_sources(config)).await;
    let page = window.location().pathname().map_err(FingerprintError::probe)?;

    Ok(FingerprintRecord::assemble(
        components,
        session_id(&window),
        page,
        SystemClock.now_iso(),
    ))
}

/// Session id kept in `sessionStorage`, or a throwaway one when storage
/// is blocked.
fn session_id(window: &Window) -> String {
    let storage = match window.session_storage() {
        Ok(Some(storage)) => storage,
        _ => return runtime::uuid_v4(),
    };
    if let Ok(Some(existing)) = storage.get_item(SESSION_KEY) {
        if !existing.is_empty() {
            return existing;
        }
    }
    let fresh = runtime::uuid_v4();
    let _ = storage.set_item(SESSION_KEY, &fresh);
    fresh
}

fn current_page() -> String {
    web_sys::window()
        .and_then(|w| w.location().pathname().ok())
        .unwrap_or_else(|| "/".to_string())
}

/// Collect and hand the record to the transport. Returns the visitor id
/// that was sent, or `None` if nothing could be queued.
pub async fn send_fingerprint(config: &ClientConfig) -> Option<String> {
    let record = collect_fingerprint(config).await;
    let body = match serde_json::to_string(&record) {
        Ok(body) => body,
        Err(e) => {
            log::debug!("Fingerprint serialization failed: {}", e);
            return None;
        }
    };

    match transport::deliver(&config.endpoint, &body) {
        Ok(delivery) => {
            log::debug!("Fingerprint queued via {:?}", delivery);
            Some(record.visitor_id)
        }
        Err(e) => {
            log::debug!("Fingerprint delivery failed: {}", e);
            None
        }
    }
}

/// Collect a record without sending it (`collectFingerprint` in JS)
#[wasm_bindgen(js_name = collectFingerprint)]
pub async fn collect_fingerprint_js(options: JsValue) -> JsValue {
    let config = ClientConfig::from_js(options);
    let record = collect_fingerprint(&config).await;
    serde_wasm_bindgen::to_value(&record).unwrap_or(JsValue::NULL)
}

/// Collect and send immediately (`sendFingerprint` in JS)
#[wasm_bindgen(js_name = sendFingerprint)]
pub async fn send_fingerprint_js(options: JsValue) -> Option<String> {
    send_fingerprint(&ClientConfig::from_js(options)).await
}

/// Schedule one collection for this page load (`initFingerprinting` in JS)
///
/// Runs after the `load` event (immediately if the document is already
/// complete) plus a random 1–3 s delay. Further calls in the same page are
/// ignored.
#[wasm_bindgen(js_name = initFingerprinting)]
pub fn init_fingerprinting(options: JsValue) {
    if !try_claim_schedule() {
        return;
    }
    let config = ClientConfig::from_js(options);
    if let Err(e) = schedule_after_load(config) {
        log::debug!("Fingerprinting not scheduled: {}", e);
    }
}

/// Claim this page's single collection slot. True only for the first
/// caller; `init_fingerprinting` does nothing once the slot is taken.
pub fn try_claim_schedule() -> bool {
    !SCHEDULED.with(|s| s.replace(true))
}

fn schedule_after_load(config: ClientConfig) -> Result<()> {
    let window = browser::window()?;
    let document = browser::document()?;

    if browser::prop_string(&document, "readyState").as_deref() == Some("complete") {
        schedule(config);
        return Ok(());
    }

    let on_load = Closure::once_into_js(move || schedule(config));
    window
        .add_event_listener_with_callback("load", on_load.unchecked_ref())
        .map_err(FingerprintError::probe)
}

fn schedule(config: ClientConfig) {
    runtime::spawn_detached(async move {
        runtime::sleep(runtime::jitter(
            config.send_delay_min_ms..=config.send_delay_max_ms,
        ))
        .await;
        let _ = send_fingerprint(&config).await;
    });
}
