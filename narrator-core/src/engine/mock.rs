//! Deterministic engine for tests and demos. Renders a tone burst per word.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::provider::{EngineCapabilities, EngineOutput, EngineRequest, SynthesisEngine};
use crate::audio::{seconds_to_samples, RawAudio, DEFAULT_SAMPLE_RATE};
use crate::error::SynthesisError;
use crate::pipeline::cancel::CancellationToken;
use crate::settings::SynthesisOptions;
use crate::text::ssml_to_plain_text;
use crate::timeline::{EntryKind, Timeline, TimelineEntry};
use crate::voice::{SynthesisVoice, VoiceGender};

/// Mock behavior for the mock engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MockBehavior {
    /// Return synthesized tones
    #[default]
    Success,
    /// Always fail with a backend error
    AlwaysBackendError,
    /// Fail the call with this zero-based index, succeed otherwise
    BackendErrorOnCall { call: usize },
}

/// Shape of the audio and timeline the mock produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockTimeline {
    /// No timeline; the pipeline falls back to alignment
    #[default]
    None,
    /// One word entry per whitespace-separated token
    Words,
    /// A single sentence entry without word children
    Coarse,
}

#[derive(Debug, Clone)]
pub struct MockEngineConfig {
    pub name: String,
    pub voices: Vec<SynthesisVoice>,
    pub sample_rate: u32,
    pub supports_ssml: bool,
    pub timeline: MockTimeline,
    pub requires_package: bool,
    pub requires_sentence_split: bool,
    /// Report speed and pitch as not applied natively
    pub defer_speed_and_pitch: bool,
    /// Key that must be present in this engine's options record
    pub required_option: Option<String>,
    pub lead_silence: f64,
    pub word_duration: f64,
    pub word_gap: f64,
    pub tail_silence: f64,
}

impl Default for MockEngineConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            voices: vec![
                SynthesisVoice::new("mock-amy", &["en-US", "en"], VoiceGender::Female),
                SynthesisVoice::new("mock-brian", &["en-GB", "en"], VoiceGender::Male),
                SynthesisVoice::new("mock-hans", &["de-DE", "de"], VoiceGender::Male),
            ],
            sample_rate: DEFAULT_SAMPLE_RATE,
            supports_ssml: false,
            timeline: MockTimeline::None,
            requires_package: false,
            requires_sentence_split: false,
            defer_speed_and_pitch: false,
            required_option: None,
            lead_silence: 0.1,
            word_duration: 0.25,
            word_gap: 0.05,
            tail_silence: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub text: String,
    pub voice: String,
    pub language: String,
    pub model_path: Option<PathBuf>,
    pub is_ssml: bool,
}

#[derive(Deserialize, Default)]
struct MockOptions {
    #[serde(default)]
    speaker: Option<u32>,
}

#[derive(Default)]
struct MockState {
    behavior: MockBehavior,
    calls: Vec<MockCall>,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// Mock synthesis engine for testing
#[derive(Clone)]
pub struct MockEngine {
    config: MockEngineConfig,
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new(config: MockEngineConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn named(name: &str) -> Self {
        Self::new(MockEngineConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        self.state().behavior = behavior;
    }

    /// Cancels `token` once `calls` synthesis calls have completed.
    pub fn cancel_after(&self, calls: usize, token: CancellationToken) {
        self.state().cancel_after = Some((calls, token));
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn config(&self) -> &MockEngineConfig {
        &self.config
    }

    /// Duration of the audio rendered for `text`.
    pub fn expected_duration(&self, text: &str) -> f64 {
        let words = text.split_whitespace().count() as f64;
        self.config.lead_silence
            + words * (self.config.word_duration + self.config.word_gap)
            + self.config.tail_silence
    }

    fn render(&self, text: &str) -> (RawAudio, Timeline) {
        let rate = self.config.sample_rate;
        let mut samples = vec![0.0f32; seconds_to_samples(self.config.lead_silence, rate)];
        let mut words = Vec::new();

        for word in text.split_whitespace() {
            let start = samples.len() as f64 / rate as f64;
            let tone_len = seconds_to_samples(self.config.word_duration, rate);
            samples.extend((0..tone_len).map(|i| {
                let t = i as f32 / rate as f32;
                0.5 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
            }));
            let end = samples.len() as f64 / rate as f64;
            words.push(TimelineEntry::word(word, start, end));
            samples.extend(std::iter::repeat(0.0).take(seconds_to_samples(self.config.word_gap, rate)));
        }
        samples.extend(std::iter::repeat(0.0).take(seconds_to_samples(self.config.tail_silence, rate)));

        (RawAudio::mono(samples, rate), words)
    }
}

#[async_trait]
impl SynthesisEngine for MockEngine {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_ssml: self.config.supports_ssml,
            provides_timeline: self.config.timeline != MockTimeline::None,
            requires_package: self.config.requires_package,
            requires_sentence_split: self.config.requires_sentence_split,
        }
    }

    fn check_configuration(&self, options: &SynthesisOptions) -> Result<(), SynthesisError> {
        let Some(key) = &self.config.required_option else {
            return Ok(());
        };
        let present = options
            .engines
            .get(&self.config.name)
            .and_then(|record| record.get(key))
            .is_some_and(|value| !value.is_null());
        if present {
            Ok(())
        } else {
            Err(SynthesisError::configuration(format!(
                "Engine '{}' requires option '{key}'",
                self.config.name
            )))
        }
    }

    fn requested_speaker(&self, options: &SynthesisOptions) -> Option<u32> {
        options.engine_options::<MockOptions>(&self.config.name).speaker
    }

    async fn list_voices(&self, _options: &SynthesisOptions) -> Result<Vec<SynthesisVoice>> {
        Ok(self.config.voices.clone())
    }

    async fn synthesize(&self, request: EngineRequest<'_>) -> Result<EngineOutput, SynthesisError> {
        let call_index = {
            let mut state = self.state();
            state.calls.push(MockCall {
                text: request.text.to_string(),
                voice: request.voice.name.clone(),
                language: request.language.to_string(),
                model_path: request.model_path.map(|p| p.to_path_buf()),
                is_ssml: request.is_ssml,
            });
            let index = state.calls.len() - 1;
            if let Some((after, token)) = &state.cancel_after {
                if state.calls.len() >= *after {
                    token.cancel();
                }
            }
            index
        };

        let fail = match self.state().behavior {
            MockBehavior::Success => false,
            MockBehavior::AlwaysBackendError => true,
            MockBehavior::BackendErrorOnCall { call } => call == call_index,
        };
        if fail {
            return Err(SynthesisError::Backend(anyhow::anyhow!(
                "mock backend failure on call {call_index}"
            )));
        }

        let text = if request.is_ssml {
            ssml_to_plain_text(request.text)
        } else {
            request.text.to_string()
        };
        let (audio, words) = self.render(&text);

        let mut output = EngineOutput::new(audio);
        output = match self.config.timeline {
            MockTimeline::None => output,
            MockTimeline::Words => output.with_timeline(words),
            MockTimeline::Coarse => {
                let duration = output.audio.duration();
                output.with_timeline(vec![TimelineEntry::new(
                    EntryKind::Sentence,
                    text.clone(),
                    0.0,
                    duration,
                )])
            }
        };
        if self.config.defer_speed_and_pitch {
            output = output.postprocess_speed_and_pitch();
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(
        text: &'a str,
        voice: &'a SynthesisVoice,
        options: &'a SynthesisOptions,
    ) -> EngineRequest<'a> {
        EngineRequest {
            text,
            voice,
            language: "en",
            options,
            model_path: None,
            is_ssml: false,
        }
    }

    #[tokio::test]
    async fn renders_one_tone_per_word() {
        let engine = MockEngine::new(MockEngineConfig {
            timeline: MockTimeline::Words,
            ..Default::default()
        });
        let voice = engine.config().voices[0].clone();
        let options = SynthesisOptions::default();

        let output = engine.synthesize(request("Hello brave world", &voice, &options)).await.unwrap();
        let timeline = output.timeline.unwrap();

        assert_eq!(timeline.len(), 3);
        assert!((timeline[0].start_time - 0.1).abs() < 1e-6);
        assert!((output.audio.duration() - engine.expected_duration("Hello brave world")).abs() < 1e-3);
        assert_eq!(engine.calls()[0].text, "Hello brave world");
    }

    #[tokio::test]
    async fn behavior_controls_failures() {
        let engine = MockEngine::named("mock");
        engine.set_behavior(MockBehavior::BackendErrorOnCall { call: 1 });
        let voice = engine.config().voices[0].clone();
        let options = SynthesisOptions::default();

        assert!(engine.synthesize(request("one", &voice, &options)).await.is_ok());
        let second = engine.synthesize(request("two", &voice, &options)).await;
        assert!(matches!(second, Err(SynthesisError::Backend(_))));
        assert!(engine.synthesize(request("three", &voice, &options)).await.is_ok());
    }
}
