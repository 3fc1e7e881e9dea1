//! `navigator.sendBeacon` delivery

use web_sys::{Blob, BlobPropertyBag, Navigator};

use super::JSON_CONTENT_TYPE;
use crate::browser;
use crate::error::{FingerprintError, Result};

pub(super) fn available(navigator: &Navigator) -> bool {
    browser::has(navigator, "sendBeacon")
}

/// Queue `body` as a JSON blob. `Ok(false)` means the browser refused to
/// queue it (payload too large or beacon quota exhausted).
pub(super) fn send(navigator: &Navigator, endpoint: &str, body: &str) -> Result<bool> {
    // A plain string would go out as text/plain; wrap it so the content
    // type is explicit.
    let parts = js_sys::Array::of1(&body.into());
    let options = BlobPropertyBag::new();
    options.set_type(JSON_CONTENT_TYPE);
    let blob = Blob::new_with_str_sequence_and_options(&parts, &options)
        .map_err(FingerprintError::probe)?;

    navigator
        .send_beacon_with_opt_blob(endpoint, Some(&blob))
        .map_err(|e| FingerprintError::Network(format!("sendBeacon threw: {:?}", e)))
}
