//! Audio-stack signature
//!
//! A muted triangle oscillator at 10 kHz feeds an analyser; after a short
//! delay the byte frequency bins are summed into one number. The result
//! depends on the platform's audio DSP (resampling, FFT implementation)
//! and is inaudible because the graph ends in a zero-gain node.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use wasm_bindgen_futures::JsFuture;
use web_sys::{AnalyserNode, AudioContext, GainNode, OscillatorNode, OscillatorType};

use super::{absorb, SignalSource};
use crate::error::{FingerprintError, Result};
use crate::identity::SignalKind;
use crate::runtime;

const FFT_SIZE: u32 = 256;
const TONE_HZ: f32 = 10_000.0;

pub struct AudioSignal {
    sample_delay: Duration,
}

impl AudioSignal {
    pub fn new(sample_delay_ms: u32) -> Self {
        Self {
            sample_delay: Duration::from_millis(sample_delay_ms as u64),
        }
    }
}

#[async_trait(?Send)]
impl SignalSource for AudioSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Audio
    }

    async fn attempt(&self) -> Option<Value> {
        absorb(self.kind(), self.probe().await)
    }
}

impl AudioSignal {
    async fn probe(&self) -> Result<String> {
        let graph = AudioGraph::start()?;
        runtime::sleep(self.sample_delay).await;
        Ok(graph.signature().to_string())
        // graph dropped here: oscillator stopped, context closed
    }
}

/// Oscillator -> analyser -> muted gain -> destination
///
/// Owns the `AudioContext`. Dropping the graph stops the oscillator and
/// closes the context, whether sampling succeeded or the probe bailed out
/// half-way through construction.
struct AudioGraph {
    context: AudioContext,
    oscillator: Option<OscillatorNode>,
    analyser: Option<AnalyserNode>,
    started: bool,
}

impl AudioGraph {
    fn start() -> Result<Self> {
        let context = AudioContext::new().map_err(FingerprintError::probe)?;
        let mut graph = AudioGraph {
            context,
            oscillator: None,
            analyser: None,
            started: false,
        };
        graph.wire()?;
        Ok(graph)
    }

    fn wire(&mut self) -> Result<()> {
        let ctx = &self.context;
        let oscillator = ctx.create_oscillator().map_err(FingerprintError::probe)?;
        let analyser = ctx.create_analyser().map_err(FingerprintError::probe)?;
        let gain: GainNode = ctx.create_gain().map_err(FingerprintError::probe)?;
        let now = ctx.current_time();

        analyser.set_fft_size(FFT_SIZE);
        oscillator.set_type(OscillatorType::Triangle);
        oscillator
            .frequency()
            .set_value_at_time(TONE_HZ, now)
            .map_err(FingerprintError::probe)?;
        gain.gain()
            .set_value_at_time(0.0, now)
            .map_err(FingerprintError::probe)?;

        oscillator
            .connect_with_audio_node(&analyser)
            .map_err(FingerprintError::probe)?;
        analyser
            .connect_with_audio_node(&gain)
            .map_err(FingerprintError::probe)?;
        gain.connect_with_audio_node(&ctx.destination())
            .map_err(FingerprintError::probe)?;

        let oscillator = self.oscillator.insert(oscillator);
        oscillator.start().map_err(FingerprintError::probe)?;
        self.started = true;
        self.analyser = Some(analyser);
        Ok(())
    }

    /// Sum of the byte frequency bins
    fn signature(&self) -> u32 {
        let Some(analyser) = &self.analyser else {
            return 0;
        };
        let mut bins = vec![0u8; analyser.frequency_bin_count() as usize];
        analyser.get_byte_frequency_data(&mut bins);
        sum_bins(&bins)
    }
}

impl Drop for AudioGraph {
    fn drop(&mut self) {
        if let (true, Some(oscillator)) = (self.started, &self.oscillator) {
            let _ = oscillator.stop();
        }
        if let Ok(promise) = self.context.close() {
            // close() rejects if the context is already closed; nothing to do
            runtime::spawn_detached(async move {
                let _ = JsFuture::from(promise).await;
            });
        }
    }
}

fn sum_bins(bins: &[u8]) -> u32 {
    bins.iter().map(|&b| b as u32).sum()
}
