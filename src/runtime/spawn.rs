//! Detached task spawning for WASM

use std::future::Future;

use wasm_bindgen_futures::spawn_local;

/// Run a future on the host event loop without the caller awaiting it
///
/// The caller may return (or the page may start unloading) while the task is
/// still in flight. Used by the browser half (keep-alive transport, the
/// scheduled send, audio teardown); edge handlers hand their background
/// work to the host instead.
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    spawn_local(future);
}
