//! Navigator properties
//!
//! Standard fields go through `web_sys::Navigator`; the non-standard ones
//! (`deviceMemory`, `connection`, `webdriver`, ...) are read reflectively
//! and reported as null where the browser lacks them.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::JsValue;

use super::{absorb, SignalSource};
use crate::browser;
use crate::error::Result;
use crate::identity::SignalKind;

/// Languages kept from `navigator.languages`
pub const MAX_LANGUAGES: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatorInfo {
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub languages: Vec<String>,
    pub platform: Option<String>,
    pub hardware_concurrency: f64,
    pub max_touch_points: i32,
    pub device_memory: Option<f64>,
    pub cookie_enabled: Option<bool>,
    pub do_not_track: Option<String>,
    pub pdf_viewer_enabled: Option<bool>,
    pub webdriver: Option<bool>,
    pub connection: Option<ConnectionInfo>,
}

/// Network Information API summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub effective_type: Option<String>,
    pub downlink: Option<f64>,
    pub rtt: Option<f64>,
}

pub struct NavigatorSignal;

#[async_trait(?Send)]
impl SignalSource for NavigatorSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Navigator
    }

    async fn attempt(&self) -> Option<Value> {
        absorb(self.kind(), probe())
    }
}

fn probe() -> Result<NavigatorInfo> {
    let navigator = browser::window()?.navigator();
    let raw: &JsValue = navigator.as_ref();

    let languages = cap_languages(navigator.languages().iter().filter_map(|l| l.as_string()));

    let connection = browser::prop(raw, "connection").map(|c| ConnectionInfo {
        effective_type: browser::prop_string(&c, "effectiveType"),
        downlink: browser::prop_f64(&c, "downlink"),
        rtt: browser::prop_f64(&c, "rtt"),
    });

    Ok(NavigatorInfo {
        user_agent: navigator.user_agent().ok(),
        language: navigator.language(),
        languages,
        platform: navigator.platform().ok(),
        hardware_concurrency: navigator.hardware_concurrency(),
        max_touch_points: navigator.max_touch_points(),
        device_memory: browser::prop_f64(raw, "deviceMemory"),
        cookie_enabled: browser::prop_bool(raw, "cookieEnabled"),
        do_not_track: browser::prop_string(raw, "doNotTrack"),
        pdf_viewer_enabled: browser::prop_bool(raw, "pdfViewerEnabled"),
        webdriver: browser::prop_bool(raw, "webdriver"),
        connection,
    })
}

/// Keep the first [`MAX_LANGUAGES`] preferred languages
pub fn cap_languages<I>(languages: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    languages.into_iter().take(MAX_LANGUAGES).collect()
}
