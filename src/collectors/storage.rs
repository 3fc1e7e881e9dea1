//! Storage availability
//!
//! `localStorage` and `sessionStorage` are probed by writing and removing a
//! key; private modes and disabled cookies make the write throw. IndexedDB
//! is probed by factory presence, since opening a database is asynchronous
//! and leaves traces.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::JsValue;
use web_sys::Storage;

use super::{absorb, SignalSource};
use crate::browser;
use crate::error::Result;
use crate::identity::SignalKind;

const PROBE_KEY: &str = "test";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub local_storage: bool,
    pub session_storage: bool,
    #[serde(rename = "indexedDB")]
    pub indexed_db: bool,
    pub cookies: Option<bool>,
}

pub struct StorageSignal;

#[async_trait(?Send)]
impl SignalSource for StorageSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Storage
    }

    async fn attempt(&self) -> Option<Value> {
        absorb(self.kind(), probe())
    }
}

fn probe() -> Result<StorageInfo> {
    let window = browser::window()?;
    let navigator: JsValue = window.navigator().into();

    Ok(StorageInfo {
        local_storage: write_probe(window.local_storage()),
        session_storage: write_probe(window.session_storage()),
        indexed_db: matches!(window.indexed_db(), Ok(Some(_))),
        cookies: browser::prop_bool(&navigator, "cookieEnabled"),
    })
}

/// Write then remove a key; any exception along the way means unavailable.
fn write_probe(storage: std::result::Result<Option<Storage>, JsValue>) -> bool {
    let Ok(Some(storage)) = storage else {
        return false;
    };
    storage.set_item(PROBE_KEY, PROBE_KEY).is_ok() && storage.remove_item(PROBE_KEY).is_ok()
}
