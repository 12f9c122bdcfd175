use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::audio::RawAudio;
use crate::error::SynthesisError;
use crate::settings::SynthesisOptions;
use crate::timeline::Timeline;
use crate::voice::SynthesisVoice;

/// What an engine can do, checked by the dispatcher before each call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCapabilities {
    pub supports_ssml: bool,
    /// The engine returns its own word timeline
    pub provides_timeline: bool,
    /// Voices reference a package that must be resolved to a local path
    pub requires_package: bool,
    /// The engine accepts one utterance per call
    pub requires_sentence_split: bool,
}

/// One sentence routed to an engine.
pub struct EngineRequest<'a> {
    pub text: &'a str,
    pub voice: &'a SynthesisVoice,
    pub language: &'a str,
    pub options: &'a SynthesisOptions,
    /// Local path of the voice's package, when the engine requires one
    pub model_path: Option<&'a Path>,
    pub is_ssml: bool,
}

#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub audio: RawAudio,
    /// Timeline relative to the start of `audio`
    pub timeline: Option<Timeline>,
    /// The engine ignored the requested speed; the postprocessor applies it
    pub should_postprocess_speed: bool,
    /// The engine ignored the requested pitch; the postprocessor applies it
    pub should_postprocess_pitch: bool,
}

impl EngineOutput {
    pub fn new(audio: RawAudio) -> Self {
        Self {
            audio,
            timeline: None,
            should_postprocess_speed: false,
            should_postprocess_pitch: false,
        }
    }

    pub fn with_timeline(mut self, timeline: Timeline) -> Self {
        self.timeline = Some(timeline);
        self
    }

    pub fn postprocess_speed_and_pitch(mut self) -> Self {
        self.should_postprocess_speed = true;
        self.should_postprocess_pitch = true;
        self
    }
}

/// A speech synthesis backend.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Registry key, e.g. `espeak`
    fn name(&self) -> &str;

    fn capabilities(&self) -> EngineCapabilities;

    /// Fails when credentials, regions or tokens this engine needs are absent.
    fn check_configuration(&self, _options: &SynthesisOptions) -> Result<(), SynthesisError> {
        Ok(())
    }

    /// Speaker id requested through this engine's options, if any.
    fn requested_speaker(&self, _options: &SynthesisOptions) -> Option<u32> {
        None
    }

    async fn list_voices(&self, options: &SynthesisOptions) -> Result<Vec<SynthesisVoice>>;

    async fn synthesize(&self, request: EngineRequest<'_>) -> Result<EngineOutput, SynthesisError>;
}

pub type SharedEngine = Arc<dyn SynthesisEngine>;
