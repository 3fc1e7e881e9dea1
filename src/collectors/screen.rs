//! Display metrics

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{absorb, SignalSource};
use crate::browser;
use crate::error::{FingerprintError, Result};
use crate::identity::SignalKind;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub avail_width: Option<i32>,
    pub avail_height: Option<i32>,
    pub color_depth: Option<i32>,
    pub pixel_depth: Option<i32>,
    pub device_pixel_ratio: f64,
    pub orientation: Option<String>,
}

pub struct ScreenSignal;

#[async_trait(?Send)]
impl SignalSource for ScreenSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Screen
    }

    async fn attempt(&self) -> Option<Value> {
        absorb(self.kind(), probe())
    }
}

fn probe() -> Result<ScreenInfo> {
    let window = browser::window()?;
    let screen = window.screen().map_err(FingerprintError::probe)?;

    let orientation = browser::prop(&screen, "orientation")
        .and_then(|o| browser::prop_string(&o, "type"));

    Ok(ScreenInfo {
        width: screen.width().ok(),
        height: screen.height().ok(),
        avail_width: screen.avail_width().ok(),
        avail_height: screen.avail_height().ok(),
        color_depth: screen.color_depth().ok(),
        pixel_depth: screen.pixel_depth().ok(),
        device_pixel_ratio: window.device_pixel_ratio(),
        orientation,
    })
}
