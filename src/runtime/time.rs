//! Wall-clock time for records, keys and TTL bookkeeping

use std::cell::Cell;

use chrono::{DateTime, SecondsFormat};

/// Source of wall-clock time in milliseconds since the Unix epoch
pub trait Clock {
    fn now_ms(&self) -> u64;

    /// Current time as an RFC 3339 timestamp with millisecond precision
    fn now_iso(&self) -> String {
        iso_timestamp(self.now_ms())
    }
}

/// Real clock (`Date.now()` in WASM, `SystemTime` natively)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        web_time::SystemTime::now()
            .duration_since(web_time::SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven clock
///
/// Every read advances the clock by `step_ms`, so successive records get
/// distinct timestamps without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    millis: Cell<u64>,
    step_ms: u64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self::with_step(start_ms, 0)
    }

    pub fn with_step(start_ms: u64, step_ms: u64) -> Self {
        Self {
            millis: Cell::new(start_ms),
            step_ms,
        }
    }

    pub fn advance(&self, ms: u64) {
        self.millis.set(self.millis.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        let now = self.millis.get();
        self.millis.set(now + self.step_ms);
        now
    }
}

/// Format epoch milliseconds as `YYYY-MM-DDTHH:MM:SS.mmmZ`
pub fn iso_timestamp(millis: u64) -> String {
    DateTime::from_timestamp_millis(millis as i64)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
