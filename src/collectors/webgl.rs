//! Graphics-stack descriptor
//!
//! Vendor and renderer come from `WEBGL_debug_renderer_info` when the
//! browser exposes it; otherwise they are reported as null and only the
//! version strings and extension list remain.

use async_trait::async_trait;
use js_sys::Array;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::JsCast;
use web_sys::WebGlRenderingContext;

use super::{absorb, SignalSource};
use crate::browser;
use crate::error::{FingerprintError, Result};
use crate::identity::SignalKind;

/// `WEBGL_debug_renderer_info.UNMASKED_VENDOR_WEBGL`
const UNMASKED_VENDOR_WEBGL: u32 = 0x9245;
/// `WEBGL_debug_renderer_info.UNMASKED_RENDERER_WEBGL`
const UNMASKED_RENDERER_WEBGL: u32 = 0x9246;

const MAX_EXTENSIONS: usize = 20;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebGlInfo {
    pub vendor: Option<String>,
    pub renderer: Option<String>,
    pub version: Option<String>,
    pub shading_version: Option<String>,
    pub extensions: Option<Vec<String>>,
}

pub struct WebGlSignal;

#[async_trait(?Send)]
impl SignalSource for WebGlSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Webgl
    }

    async fn attempt(&self) -> Option<Value> {
        absorb(self.kind(), probe())
    }
}

fn probe() -> Result<WebGlInfo> {
    let canvas = browser::create_canvas()?;
    let context = match canvas.get_context("webgl").map_err(FingerprintError::probe)? {
        Some(ctx) => Some(ctx),
        None => canvas
            .get_context("experimental-webgl")
            .map_err(FingerprintError::probe)?,
    };
    let gl = context
        .ok_or(FingerprintError::MissingGlobal("WebGLRenderingContext"))?
        .dyn_into::<WebGlRenderingContext>()
        .map_err(|_| FingerprintError::Probe("not a WebGL context".into()))?;

    let param = |name: u32| gl.get_parameter(name).ok().and_then(|v| v.as_string());

    let debug_info = gl
        .get_extension("WEBGL_debug_renderer_info")
        .ok()
        .flatten();
    let (vendor, renderer) = match debug_info {
        Some(_) => (param(UNMASKED_VENDOR_WEBGL), param(UNMASKED_RENDERER_WEBGL)),
        None => (None, None),
    };

    Ok(WebGlInfo {
        vendor,
        renderer,
        version: param(WebGlRenderingContext::VERSION),
        shading_version: param(WebGlRenderingContext::SHADING_LANGUAGE_VERSION),
        extensions: gl.get_supported_extensions().map(first_extensions),
    })
}

fn first_extensions(list: Array) -> Vec<String> {
    list.iter()
        .filter_map(|v| v.as_string())
        .take(MAX_EXTENSIONS)
        .collect()
}
