//! Installed-font detection
//!
//! A candidate font counts as installed when text rendered in
//! `'<candidate>', <fallback>` measures differently from the bare fallback
//! for any of the three generic families. Synchronous and deterministic.

use async_trait::async_trait;
use serde_json::Value;

use super::{absorb, SignalSource};
use crate::browser;
use crate::error::{FingerprintError, Result};
use crate::identity::SignalKind;

pub const CANDIDATE_FONTS: [&str; 20] = [
    "Arial",
    "Arial Black",
    "Calibri",
    "Cambria",
    "Comic Sans MS",
    "Courier New",
    "Georgia",
    "Helvetica",
    "Impact",
    "Lucida Console",
    "Palatino Linotype",
    "Tahoma",
    "Times New Roman",
    "Trebuchet MS",
    "Verdana",
    "Consolas",
    "Monaco",
    "Menlo",
    "Ubuntu",
    "Roboto",
];

pub const BASE_FONTS: [&str; 3] = ["monospace", "sans-serif", "serif"];

const TEST_STRING: &str = "mmmmmmmmmmlli";
const TEST_SIZE: &str = "72px";

pub struct FontSignal;

#[async_trait(?Send)]
impl SignalSource for FontSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Fonts
    }

    async fn attempt(&self) -> Option<Value> {
        absorb(self.kind(), probe())
    }
}

fn probe() -> Result<Vec<String>> {
    let canvas = browser::create_canvas()?;
    let ctx = browser::context_2d(&canvas)?;

    let mut failure = None;
    let detected = detect_fonts(|font| {
        ctx.set_font(font);
        match ctx.measure_text(TEST_STRING) {
            Ok(metrics) => metrics.width(),
            Err(e) => {
                failure.get_or_insert(e);
                0.0
            }
        }
    });

    match failure {
        Some(e) => Err(FingerprintError::probe(e)),
        None => Ok(detected),
    }
}

/// Run the width comparison with `measure` returning the text width for a
/// CSS font shorthand.
pub fn detect_fonts<F>(mut measure: F) -> Vec<String>
where
    F: FnMut(&str) -> f64,
{
    let baselines: Vec<f64> = BASE_FONTS
        .iter()
        .map(|base| measure(&format!("{} {}", TEST_SIZE, base)))
        .collect();

    CANDIDATE_FONTS
        .iter()
        .filter(|candidate| {
            BASE_FONTS.iter().zip(&baselines).any(|(base, baseline)| {
                measure(&format!("{} '{}', {}", TEST_SIZE, candidate, base)) != *baseline
            })
        })
        .map(|candidate| candidate.to_string())
        .collect()
}
