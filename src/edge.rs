//! Edge runtime entry point
//!
//! ```javascript
//! import init, { EdgeApp } from './pkg/visitor_fp.js';
//!
//! let app;
//! export default {
//!   async fetch(request, env, ctx) {
//!     await init();
//!     app ??= new EdgeApp(env);
//!     return app.fetch(request, ctx);
//!   },
//! };
//! ```
//!
//! One `EdgeApp` lives as long as the worker isolate; its config cache is
//! shared by the requests it serves and by nothing else. Work a handler
//! leaves behind (the relay POST) is registered with `ctx.waitUntil` so the
//! host keeps it alive after the response; without `ctx` it still runs but
//! the host may cancel it.

use std::rc::Rc;

use js_sys::{Array, Function, Promise, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{Headers, Request, Response, ResponseInit};

use crate::config::EdgeConfig;
use crate::error::{FingerprintError, Result};
use crate::server::{self, BackgroundTask, EdgeContext, EdgeRequest, EdgeResponse};
use crate::storage::JsKv;

/// Request handler bound to one host environment
#[wasm_bindgen]
pub struct EdgeApp {
    ctx: Rc<EdgeContext>,
}

#[wasm_bindgen]
impl EdgeApp {
    /// Build the handler from the host `env` (variables and KV bindings)
    #[wasm_bindgen(constructor)]
    pub fn new(env: JsValue) -> EdgeApp {
        let config = EdgeConfig::from_env(&env);
        let fingerprints = JsKv::from_env(&env, &config.fingerprint_binding);
        let site_config = JsKv::from_env(&env, &config.config_binding);
        log::info!(
            "Edge app ready (fingerprints bound: {}, site config bound: {}, relay: {})",
            fingerprints.is_some(),
            site_config.is_some(),
            config.relay_target().is_some()
        );

        let mut ctx = EdgeContext::new(config);
        if let Some(kv) = fingerprints {
            ctx = ctx.with_fingerprints(Rc::new(kv));
        }
        if let Some(kv) = site_config {
            ctx = ctx.with_site_config(Rc::new(kv));
        }
        EdgeApp { ctx: Rc::new(ctx) }
    }

    /// Handle one request; resolves to a `Response`
    ///
    /// `exec_ctx` is the host's execution context (anything with a
    /// `waitUntil(promise)` method), or `undefined`.
    pub fn fetch(&self, request: Request, exec_ctx: JsValue) -> Promise {
        let ctx = Rc::clone(&self.ctx);
        future_to_promise(async move {
            let response = match read_request(&request).await {
                Ok(edge_request) => server::route(&ctx, &edge_request).await,
                Err(e) => server::unreadable_request(&request.url(), &e),
            };
            // `route` does not yield after a handler queues work, so every
            // task drained here belongs to this request
            for task in ctx.background.take() {
                wait_until(&exec_ctx, task);
            }
            Ok(write_response(&response)?.into())
        })
    }
}

/// Start `task` and register it with the host so it outlives the response
fn wait_until(exec_ctx: &JsValue, task: BackgroundTask) {
    let promise = future_to_promise(async move {
        task.await;
        Ok(JsValue::UNDEFINED)
    });

    let register = Reflect::get(exec_ctx, &JsValue::from_str("waitUntil"))
        .ok()
        .and_then(|f| f.dyn_into::<Function>().ok());
    match register {
        Some(register) => {
            if let Err(e) = register.call1(exec_ctx, &promise) {
                log::warn!("waitUntil rejected background task: {:?}", e);
            }
        }
        None => log::debug!("No execution context; background task left unregistered"),
    }
}

async fn read_request(request: &Request) -> Result<EdgeRequest> {
    let mut edge_request = EdgeRequest::new(request.method(), request.url());

    if let Some(entries) = js_sys::try_iter(request.headers().as_ref()).map_err(host_error)? {
        for entry in entries {
            let pair: Array = entry.map_err(host_error)?.unchecked_into();
            if let (Some(name), Some(value)) = (pair.get(0).as_string(), pair.get(1).as_string()) {
                edge_request.set_header(&name, value);
            }
        }
    }

    let text = JsFuture::from(request.text().map_err(host_error)?)
        .await
        .map_err(host_error)?;
    edge_request.body = text.as_string().filter(|body| !body.is_empty());

    if let Ok(cf) = Reflect::get(request, &JsValue::from_str("cf")) {
        if cf.is_object() {
            edge_request.cf = serde_wasm_bindgen::from_value(cf).unwrap_or_default();
        }
    }

    Ok(edge_request)
}

fn write_response(response: &EdgeResponse) -> Result<Response> {
    let headers = Headers::new().map_err(host_error)?;
    for (name, value) in &response.headers {
        headers.append(name, value).map_err(host_error)?;
    }

    let init = ResponseInit::new();
    init.set_status(response.status);
    init.set_headers(&headers);

    Response::new_with_opt_str_and_init(response.body.as_deref(), &init).map_err(host_error)
}

fn host_error(err: JsValue) -> FingerprintError {
    FingerprintError::Internal(format!("{:?}", err))
}
