//! Browser signal collectors
//!
//! Each collector probes one category of environment signal and either
//! returns a JSON value or `None`. Probes share no state and never fail
//! past their own boundary, so one broken API (a blocked canvas, a missing
//! `AudioContext`) only costs that one component.
//!
//! ```javascript
//! import init, { collectFingerprint } from './pkg/visitor_fp.js';
//! await init();
//! const record = await collectFingerprint();
//! ```

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::identity::{FingerprintComponents, SignalKind};

pub mod audio;
pub mod canvas;
pub mod fonts;
pub mod navigator;
pub mod screen;
pub mod storage;
pub mod timezone;
pub mod touch;
pub mod webgl;

/// One independent fingerprint probe
#[async_trait(?Send)]
pub trait SignalSource {
    /// Component this source fills in
    fn kind(&self) -> SignalKind;

    /// Run the probe; `None` when the signal could not be read
    async fn attempt(&self) -> Option<Value>;
}

/// Turn a probe result into an optional component value, logging the
/// failure at debug level only.
pub(crate) fn absorb<T: serde::Serialize>(kind: SignalKind, result: Result<T>) -> Option<Value> {
    match result.and_then(|v| serde_json::to_value(v).map_err(Into::into)) {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("{} probe failed: {}", kind.name(), e);
            None
        }
    }
}

/// The fixed registry of probes, audio first since it is the only one that
/// suspends.
pub fn default_sources(config: &ClientConfig) -> Vec<Box<dyn SignalSource>> {
    vec![
        Box::new(audio::AudioSignal::new(config.audio_sample_ms)),
        Box::new(canvas::CanvasSignal),
        Box::new(webgl::WebGlSignal),
        Box::new(fonts::FontSignal),
        Box::new(screen::ScreenSignal),
        Box::new(navigator::NavigatorSignal),
        Box::new(timezone::TimezoneSignal),
        Box::new(touch::TouchSignal),
        Box::new(storage::StorageSignal),
    ]
}

/// Run every source and gather the results
pub async fn collect_components(sources: &[Box<dyn SignalSource>]) -> FingerprintComponents {
    let mut components = FingerprintComponents::new();
    for source in sources {
        components.insert(source.kind(), source.attempt().await);
    }
    log::debug!(
        "Collected {}/{} fingerprint components",
        components.collected_count(),
        sources.len()
    );
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FingerprintError;
    use futures::executor::block_on;
    use serde_json::json;

    struct Fixed(SignalKind, Option<Value>);

    #[async_trait(?Send)]
    impl SignalSource for Fixed {
        fn kind(&self) -> SignalKind {
            self.0
        }

        async fn attempt(&self) -> Option<Value> {
            self.1.clone()
        }
    }

    #[test]
    fn test_failed_source_does_not_stop_others() {
        let sources: Vec<Box<dyn SignalSource>> = vec![
            Box::new(Fixed(SignalKind::Canvas, None)),
            Box::new(Fixed(SignalKind::Audio, Some(json!("311")))),
            Box::new(Fixed(SignalKind::Touch, Some(json!({"touchSupport": true})))),
        ];
        let components = block_on(collect_components(&sources));

        assert_eq!(components.collected_count(), 2);
        assert!(components.get(SignalKind::Canvas).is_none());
        assert_eq!(components.get(SignalKind::Audio), Some(&json!("311")));
        assert_eq!(
            components.canonical_json(),
            r#"{"canvas":null,"audio":"311","touch":{"touchSupport":true}}"#
        );
    }

    #[test]
    fn test_absorb() {
        assert_eq!(absorb(SignalKind::Audio, Ok("12".to_string())), Some(json!("12")));
        let failed: Result<String> = Err(FingerprintError::MissingGlobal("AudioContext"));
        assert_eq!(absorb(SignalKind::Audio, failed), None);
    }

    #[test]
    fn test_registry_covers_every_kind_once() {
        let sources = default_sources(&ClientConfig::default());
        let kinds: Vec<SignalKind> = sources.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds.len(), SignalKind::ALL.len());
        for kind in SignalKind::ALL {
            assert_eq!(kinds.iter().filter(|k| **k == kind).count(), 1, "{:?}", kind);
        }
        assert_eq!(kinds[0], SignalKind::Audio);
    }
}
