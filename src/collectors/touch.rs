//! Touch and pointer capability

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{absorb, SignalSource};
use crate::browser;
use crate::error::Result;
use crate::identity::SignalKind;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TouchInfo {
    pub touch_support: bool,
    pub max_touch_points: i32,
    pub pointer_type: &'static str,
}

pub struct TouchSignal;

#[async_trait(?Send)]
impl SignalSource for TouchSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Touch
    }

    async fn attempt(&self) -> Option<Value> {
        absorb(self.kind(), probe())
    }
}

fn probe() -> Result<TouchInfo> {
    let window = browser::window()?;
    let max_touch_points = window.navigator().max_touch_points().max(0);

    Ok(TouchInfo {
        touch_support: browser::has(&window, "ontouchstart"),
        max_touch_points,
        pointer_type: if browser::has(&window, "PointerEvent") {
            "pointer"
        } else {
            "touch"
        },
    })
}
