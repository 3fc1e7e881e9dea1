//! Thin wrappers over browser / worker globals.
//!
//! Reads that may hit a missing API go through `Reflect` and come back as
//! `Option`, so a probe never has to care whether a property exists.

use js_sys::{Function, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    CanvasRenderingContext2d, Document, HtmlCanvasElement, Request, RequestInit, RequestMode,
    Response, Window,
};

use crate::error::{FingerprintError, Result};

/// Get the page's window object.
pub fn window() -> Result<Window> {
    web_sys::window().ok_or(FingerprintError::MissingGlobal("window"))
}

/// Get the page's document.
pub fn document() -> Result<Document> {
    window()?
        .document()
        .ok_or(FingerprintError::MissingGlobal("document"))
}

/// Create a detached `<canvas>` element.
pub fn create_canvas() -> Result<HtmlCanvasElement> {
    document()?
        .create_element("canvas")
        .map_err(FingerprintError::probe)?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| FingerprintError::Probe("element is not a canvas".into()))
}

/// Get the 2D context of a canvas.
pub fn context_2d(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d> {
    canvas
        .get_context("2d")
        .map_err(FingerprintError::probe)?
        .ok_or(FingerprintError::MissingGlobal("CanvasRenderingContext2D"))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| FingerprintError::Probe("not a 2d context".into()))
}

/// Whether `name` is present on `target` (the `in` operator).
pub fn has(target: &JsValue, name: &str) -> bool {
    Reflect::has(target, &JsValue::from_str(name)).unwrap_or(false)
}

/// Read a property; `undefined`, `null` and getter exceptions all give `None`.
pub fn prop(target: &JsValue, name: &str) -> Option<JsValue> {
    Reflect::get(target, &JsValue::from_str(name))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

pub fn prop_string(target: &JsValue, name: &str) -> Option<String> {
    prop(target, name).and_then(|v| v.as_string())
}

pub fn prop_f64(target: &JsValue, name: &str) -> Option<f64> {
    prop(target, name).and_then(|v| v.as_f64())
}

pub fn prop_bool(target: &JsValue, name: &str) -> Option<bool> {
    prop(target, name).and_then(|v| v.as_bool())
}

/// Call the global `fetch` (window or worker scope) and wait for the response.
pub async fn global_fetch(request: &Request) -> Result<Response> {
    let global = js_sys::global();
    let fetch: Function = Reflect::get(&global, &JsValue::from_str("fetch"))
        .ok()
        .and_then(|f| f.dyn_into().ok())
        .ok_or(FingerprintError::MissingGlobal("fetch"))?;

    let promise = fetch
        .call1(&global, request)
        .map_err(|e| FingerprintError::Network(format!("fetch threw: {:?}", e)))?;

    let value = JsFuture::from(js_sys::Promise::from(promise))
        .await
        .map_err(|e| FingerprintError::Network(format!("fetch failed: {:?}", e)))?;

    value
        .dyn_into::<Response>()
        .map_err(|_| FingerprintError::Network("fetch did not return a Response".into()))
}

/// Build a CORS `POST` carrying a JSON body.
pub fn json_post(url: &str, body: &str, keepalive: bool) -> Result<Request> {
    let opts = RequestInit::new();
    opts.set_method("POST");
    opts.set_mode(RequestMode::Cors);
    // web-sys has no `set_keepalive` binding; set the dictionary member directly.
    let _ = js_sys::Reflect::set(&opts, &"keepalive".into(), &keepalive.into());
    opts.set_body(&body.into());

    let request = Request::new_with_str_and_init(url, &opts)
        .map_err(|e| FingerprintError::Network(format!("Request::new failed: {:?}", e)))?;
    request
        .headers()
        .set("Content-Type", "application/json")
        .map_err(|e| FingerprintError::Network(format!("set header failed: {:?}", e)))?;
    Ok(request)
}
