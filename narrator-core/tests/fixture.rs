use std::sync::Arc;
use std::time::Duration;

use narrator_core::engine::mock::{MockEngine, MockEngineConfig};
use narrator_core::pipeline::EventSender;
use narrator_core::voice::VoiceListCache;
use narrator_core::{
    CancellationToken, EngineRegistry, SynthesisError, SynthesisOptions, SynthesisResult,
    Synthesizer,
};
use tempfile::TempDir;

pub struct Fixture {
    pub synthesizer: Synthesizer,
    pub engine: MockEngine,
    pub cache_dir: TempDir,
}

impl Fixture {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::with_config(MockEngineConfig::default())
    }

    pub fn with_config(config: MockEngineConfig) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let cache_dir = TempDir::new().unwrap();
        let engine = MockEngine::new(config);
        let synthesizer = Synthesizer::builder()
            .registry(EngineRegistry::new(vec![Arc::new(engine.clone())]))
            .voice_cache(VoiceListCache::new(
                cache_dir.path(),
                Duration::from_secs(3600),
            ))
            .build();

        Fixture {
            synthesizer,
            engine,
            cache_dir,
        }
    }

    /// Options routed to the mock engine in English.
    pub fn options(&self) -> SynthesisOptions {
        SynthesisOptions {
            engine: Some(self.engine.config().name.clone()),
            language: Some("en".to_string()),
            ..Default::default()
        }
    }

    #[allow(dead_code)]
    pub async fn synthesize(
        &self,
        segments: &[&str],
        options: SynthesisOptions,
    ) -> Result<SynthesisResult, SynthesisError> {
        self.synthesize_with(segments, options, &CancellationToken::new(), None)
            .await
    }

    pub async fn synthesize_with(
        &self,
        segments: &[&str],
        options: SynthesisOptions,
        cancel: &CancellationToken,
        events: Option<&EventSender>,
    ) -> Result<SynthesisResult, SynthesisError> {
        let segments: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
        self.synthesizer
            .synthesize_segments(&segments, options, cancel, events)
            .await
    }
}

/// One sample of slack at the mock's sample rate, plus float noise.
#[allow(dead_code)]
pub const SAMPLE_TOLERANCE: f64 = 1.0 / 24000.0 + 1e-9;
