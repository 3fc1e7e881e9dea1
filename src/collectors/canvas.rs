//! Rendering-surface signature
//!
//! Draws a fixed scene (filled rect, two text runs, an arc) onto an
//! off-screen 200x50 canvas and serializes it as a data URL. Anti-aliasing,
//! font rasterization and GPU compositing make the bytes differ between
//! browser/OS/GPU stacks while staying stable on one machine.

use async_trait::async_trait;
use serde_json::Value;

use super::{absorb, SignalSource};
use crate::browser;
use crate::error::{FingerprintError, Result};
use crate::identity::SignalKind;

const WIDTH: u32 = 200;
const HEIGHT: u32 = 50;

/// Text runs of the scene. Changing either one changes every visitor id.
const FIRST_RUN: &str = "paint.toth.ink";
const SECOND_RUN: &str = "legal services";

pub struct CanvasSignal;

#[async_trait(?Send)]
impl SignalSource for CanvasSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Canvas
    }

    async fn attempt(&self) -> Option<Value> {
        absorb(self.kind(), probe())
    }
}

fn probe() -> Result<String> {
    let canvas = browser::create_canvas()?;
    canvas.set_width(WIDTH);
    canvas.set_height(HEIGHT);
    let ctx = browser::context_2d(&canvas)?;

    ctx.set_text_baseline("alphabetic");
    ctx.set_font("14px Arial");
    ctx.set_fill_style_str("#f60");
    ctx.fill_rect(125.0, 1.0, 62.0, 20.0);

    ctx.set_fill_style_str("#069");
    ctx.fill_text(FIRST_RUN, 2.0, 15.0)
        .map_err(FingerprintError::probe)?;
    ctx.set_fill_style_str("rgba(102, 204, 0, 0.7)");
    ctx.fill_text(SECOND_RUN, 4.0, 37.0)
        .map_err(FingerprintError::probe)?;

    ctx.set_stroke_style_str("#f0f");
    ctx.begin_path();
    ctx.arc_with_anticlockwise(50.0, 25.0, 20.0, 0.0, std::f64::consts::PI * 2.0, true)
        .map_err(FingerprintError::probe)?;
    ctx.stroke();

    canvas.to_data_url().map_err(FingerprintError::probe)
}
