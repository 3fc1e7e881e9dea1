//! WASM-compatible runtime helpers
//!
//! Timers, detached tasks, wall-clock time and random identifiers that work
//! both inside the browser page and inside an edge function isolate. Every
//! helper also builds natively so the server logic can be unit-tested.

mod sleep;
mod spawn;
mod time;

pub use sleep::{jitter, sleep, WasmSleep};
pub use spawn::spawn_detached;
pub use time::{iso_timestamp, Clock, ManualClock, SystemClock};

/// Generate a random UUID v4 string
///
/// Used for server-side visitor ids, session ids and the fallback id of a
/// failed collection.
pub fn uuid_v4() -> String {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes).unwrap_or_else(|_| {
        // Fallback to wall clock if the entropy source is unavailable
        let now = SystemClock.now_ms();
        bytes[0..8].copy_from_slice(&now.to_le_bytes());
        bytes[8..16].copy_from_slice(&now.rotate_left(29).to_le_bytes());
    });

    // Version 4, RFC 4122 variant
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}
