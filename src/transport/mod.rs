//! Fire-and-forget delivery of the fingerprint record
//!
//! One mechanism is picked per record:
//!
//! ```text
//! navigator.sendBeacon(endpoint, Blob[application/json])   (survives unload)
//!   ↓ only when sendBeacon does not exist
//! fetch(endpoint, { method: POST, keepalive: true })      (detached task)
//! ```
//!
//! Exactly one delivery is attempted per record. A beacon the browser
//! refuses or that throws is reported as an error, never resent through
//! fetch. No error reaches the page.

mod beacon;
mod keepalive;

use crate::browser;
use crate::error::{FingerprintError, Result};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// How a payload was handed off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Beacon,
    KeepAliveFetch,
}

/// Hand a serialized record to the browser for background delivery.
///
/// Returns once the payload is queued; the network exchange itself is
/// never awaited.
pub fn deliver(endpoint: &str, body: &str) -> Result<Delivery> {
    let window = browser::window()?;
    let navigator = window.navigator();

    if beacon::available(&navigator) {
        return beacon_outcome(beacon::send(&navigator, endpoint, body));
    }

    keepalive::send(endpoint, body)?;
    Ok(Delivery::KeepAliveFetch)
}

/// A beacon attempt is final whether or not the browser queued it
fn beacon_outcome(queued: Result<bool>) -> Result<Delivery> {
    match queued? {
        true => Ok(Delivery::Beacon),
        false => Err(FingerprintError::Network("beacon refused".into())),
    }
}
