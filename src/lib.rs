//! # visitor-fp
//!
//! Browser fingerprint collection and its edge-side ingestion, compiled to
//! WebAssembly.
//!
//! ## Architecture
//!
//! ```text
//! Browser page                           Edge function
//! ────────────                           ─────────────
//! collectors (9 probes)                  EdgeApp::fetch
//!   ↓                                      ↓
//! identity (hash + confidence)           server::route
//!   ↓                                      ├─ /api/fingerprint       ingest → KV + relay
//! transport (beacon / keepalive)  ──▶      ├─ /api/fingerprint/list  admin listing
//!                                          └─ /api/config/{get,update}
//! ```
//!
//! The browser half never throws into the page and never delays it: every
//! failure degrades to "nothing sent". The edge half is stateless per
//! request apart from the site-config cache owned by its `EdgeApp`.
//!
//! Everything below `server`, `storage` and `identity` is host-neutral and
//! tested natively; the collectors and transport need a browser.

use wasm_bindgen::prelude::*;

// Modules
pub mod browser;
pub mod client;
pub mod collectors;
pub mod config;
pub mod edge;
mod error;
pub mod identity;
pub mod runtime;
pub mod server;
pub mod storage;
pub mod transport;

pub use client::{collect_fingerprint, init_fingerprinting, send_fingerprint};
pub use collectors::{collect_components, default_sources, SignalSource};
pub use config::{ClientConfig, EdgeConfig};
pub use edge::EdgeApp;
pub use error::{ErrorCode, ErrorInfo, FingerprintError, Result};
pub use identity::{
    confidence, synthesize, visitor_id, FingerprintComponents, FingerprintRecord, Identity,
    SignalKind,
};
pub use server::{route, EdgeContext, EdgeRequest, EdgeResponse};
pub use storage::{JsKv, KvNamespace, MemoryKv};

/// Module initialisation
///
/// Installs the console logger. A second initialisation (the module being
/// instantiated twice in one realm) keeps the first logger.
#[wasm_bindgen(start)]
pub fn init() {
    let level = if cfg!(debug_assertions) {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    if console_log::init_with_level(level).is_ok() {
        log::debug!("visitor-fp initialized");
    }
}
