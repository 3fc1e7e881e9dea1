//! Timer futures backed by the host's `setTimeout`

use std::future::Future;
use std::ops::RangeInclusive;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use gloo_timers::future::TimeoutFuture;
use rand::Rng;

/// A future that resolves after a specified duration
///
/// Uses the global `setTimeout`, so it works in a window and in a worker
/// isolate alike.
pub struct WasmSleep {
    inner: TimeoutFuture,
}

impl WasmSleep {
    pub fn new(duration: Duration) -> Self {
        Self {
            inner: TimeoutFuture::new(duration.as_millis().min(u32::MAX as u128) as u32),
        }
    }
}

impl Future for WasmSleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

/// Sleep for the specified duration
pub fn sleep(duration: Duration) -> WasmSleep {
    WasmSleep::new(duration)
}

/// Pick a uniformly random delay from an inclusive millisecond window
pub fn jitter(window_ms: RangeInclusive<u32>) -> Duration {
    let (lo, hi) = window_ms.into_inner();
    if hi <= lo {
        return Duration::from_millis(lo as u64);
    }
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi) as u64)
}
