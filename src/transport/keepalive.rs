//! `fetch(..., { keepalive: true })` delivery

use crate::browser;
use crate::error::Result;
use crate::runtime;

/// Build the request and start it on a detached task. Fetch errors are
/// swallowed inside the task.
pub(super) fn send(endpoint: &str, body: &str) -> Result<()> {
    let request = browser::json_post(endpoint, body, true)?;

    runtime::spawn_detached(async move {
        if let Err(e) = browser::global_fetch(&request).await {
            log::debug!("Keepalive delivery failed: {}", e);
        }
    });
    Ok(())
}
