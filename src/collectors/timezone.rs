//! Timezone and locale

use async_trait::async_trait;
use js_sys::{Array, Date, Intl, Object};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::JsValue;

use super::{absorb, SignalSource};
use crate::browser;
use crate::error::{FingerprintError, Result};
use crate::identity::SignalKind;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimezoneInfo {
    /// Resolved IANA zone, e.g. `America/Los_Angeles`
    pub timezone: Option<String>,
    /// Minutes behind UTC, as `Date.prototype.getTimezoneOffset`
    pub timezone_offset: f64,
    /// Today's date in the browser locale's short format
    pub date_format: Option<String>,
    pub locale: Option<String>,
}

pub struct TimezoneSignal;

#[async_trait(?Send)]
impl SignalSource for TimezoneSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Timezone
    }

    async fn attempt(&self) -> Option<Value> {
        absorb(self.kind(), probe())
    }
}

fn probe() -> Result<TimezoneInfo> {
    let locale = browser::window()?.navigator().language();
    let date = Date::new_0();

    let resolved = Intl::DateTimeFormat::new(&Array::new(), &Object::new()).resolved_options();
    let timezone = browser::prop_string(&resolved, "timeZone");

    let locales = match &locale {
        Some(tag) => Array::of1(&JsValue::from_str(tag)),
        None => Array::new(),
    };
    let date_format = Intl::DateTimeFormat::new(&locales, &Object::new())
        .format()
        .call1(&JsValue::UNDEFINED, &date)
        .map_err(FingerprintError::probe)?
        .as_string();

    Ok(TimezoneInfo {
        timezone,
        timezone_offset: date.get_timezone_offset(),
        date_format,
        locale,
    })
}
