//! The synthesis pipeline: resolve options, decompose input, synthesize
//! sentence by sentence, assemble the timeline and postprocess.

pub mod cancel;
pub mod events;
pub mod postprocess;
pub mod resolve;

use std::sync::Arc;
use tracing::{debug, info};

pub use cancel::CancellationToken;
pub use events::{event_channel, EventReceiver, EventSender, SegmentEvent, SentenceEvent, SynthesisEvent};
pub use postprocess::{PostprocessStage, Postprocessor};
pub use resolve::{OptionsResolver, ResolvedSynthesis, FALLBACK_ENGINE, OFFLINE_ENGINE_PRIORITY};

use crate::alignment::{Aligner, ProportionalAligner};
use crate::audio::gain::peak_decibels;
use crate::audio::trim::trim_audio_end;
use crate::audio::{RawAudio, DEFAULT_SAMPLE_RATE};
use crate::engine::{dispatch, DirectoryPackageResolver, EngineRegistry, PackageResolver, SharedEngine};
use crate::error::SynthesisError;
use crate::settings::SynthesisOptions;
use crate::text::{decompose_segment, split_paragraphs, PunctuationSentenceSplitter, SentenceSplitter};
use crate::timeline::{retain_words, Timeline, TimelineAssembler};
use crate::voice::language::normalize_language_code;
use crate::voice::{filter_voices, LanguageDetector, ScriptLanguageDetector, SynthesisVoice, VoiceListCache, VoiceQuery};
use postprocess::{time_pitch_factors, AlignmentSource};

/// Audio and timeline of one input segment. The timeline is relative to the
/// segment start.
#[derive(Debug, Clone)]
pub struct SegmentOutput {
    pub text: String,
    pub audio: RawAudio,
    pub timeline: Timeline,
}

#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub audio: RawAudio,
    pub timeline: Timeline,
    pub language: String,
    /// `None` only for empty input, which never reaches an engine
    pub voice: Option<SynthesisVoice>,
    pub engine: Option<String>,
    pub segments: Vec<SegmentOutput>,
}

/// Entry point of the pipeline. Holds the engine registry and the
/// collaborators; every call carries its own options snapshot and
/// cancellation token, so one synthesizer serves concurrent calls.
pub struct Synthesizer {
    registry: EngineRegistry,
    voice_cache: Option<VoiceListCache>,
    splitter: Arc<dyn SentenceSplitter>,
    detector: Arc<dyn LanguageDetector>,
    aligner: Arc<dyn Aligner>,
    packages: Arc<dyn PackageResolver>,
}

pub struct SynthesizerBuilder {
    registry: EngineRegistry,
    voice_cache: Option<VoiceListCache>,
    splitter: Arc<dyn SentenceSplitter>,
    detector: Arc<dyn LanguageDetector>,
    aligner: Arc<dyn Aligner>,
    packages: Arc<dyn PackageResolver>,
}

impl Default for SynthesizerBuilder {
    fn default() -> Self {
        Self {
            registry: EngineRegistry::with_default_engines(),
            voice_cache: None,
            splitter: Arc::new(PunctuationSentenceSplitter),
            detector: Arc::new(ScriptLanguageDetector::default()),
            aligner: Arc::new(ProportionalAligner),
            packages: Arc::new(DirectoryPackageResolver),
        }
    }
}

impl SynthesizerBuilder {
    pub fn registry(mut self, registry: EngineRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Registers an additional engine on the current registry.
    pub fn engine(mut self, engine: SharedEngine) -> Self {
        self.registry.register(engine);
        self
    }

    /// Fixed voice cache; by default it is derived from each call's options.
    pub fn voice_cache(mut self, cache: VoiceListCache) -> Self {
        self.voice_cache = Some(cache);
        self
    }

    pub fn splitter(mut self, splitter: Arc<dyn SentenceSplitter>) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn aligner(mut self, aligner: Arc<dyn Aligner>) -> Self {
        self.aligner = aligner;
        self
    }

    pub fn package_resolver(mut self, packages: Arc<dyn PackageResolver>) -> Self {
        self.packages = packages;
        self
    }

    pub fn build(self) -> Synthesizer {
        Synthesizer {
            registry: self.registry,
            voice_cache: self.voice_cache,
            splitter: self.splitter,
            detector: self.detector,
            aligner: self.aligner,
            packages: self.packages,
        }
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Synthesizer {
    pub fn builder() -> SynthesizerBuilder {
        SynthesizerBuilder::default()
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    fn resolver(&self) -> OptionsResolver<'_> {
        OptionsResolver {
            registry: &self.registry,
            voice_cache: self.voice_cache.as_ref(),
            detector: self.detector.as_ref(),
        }
    }

    /// Plain text input: blank-line separated paragraphs become segments.
    pub async fn synthesize(
        &self,
        text: &str,
        options: SynthesisOptions,
        cancel: &CancellationToken,
        events: Option<&EventSender>,
    ) -> Result<SynthesisResult, SynthesisError> {
        let segments = if options.ssml {
            vec![text.to_string()]
        } else {
            split_paragraphs(text)
        };
        self.synthesize_segments(&segments, options, cancel, events).await
    }

    /// Voices of the requested engine (or the engine that would be chosen for
    /// the requested language), filtered by the requested language, gender
    /// and voice name.
    pub async fn list_voices(
        &self,
        options: &SynthesisOptions,
    ) -> Result<Vec<SynthesisVoice>, SynthesisError> {
        let resolver = self.resolver();
        let language = options.language.as_deref().map(normalize_language_code);

        let probe_options = SynthesisOptions {
            voice: None,
            ..options.clone()
        };
        let engine = resolver
            .resolve_engine(language.as_deref(), &probe_options)
            .await?;
        let voices = resolver
            .voices_for(&engine, options)
            .await
            .map_err(SynthesisError::Backend)?;

        Ok(filter_voices(
            &voices,
            &VoiceQuery {
                language,
                gender: options.voice_gender,
                name: options.voice.clone(),
            },
        ))
    }

    /// Synthesizes `segments` in order. Either the whole result is returned or
    /// the call fails; partial audio is discarded on error or cancellation.
    pub async fn synthesize_segments(
        &self,
        segments: &[String],
        options: SynthesisOptions,
        cancel: &CancellationToken,
        events: Option<&EventSender>,
    ) -> Result<SynthesisResult, SynthesisError> {
        if segments.is_empty() {
            let language = options
                .language
                .as_deref()
                .unwrap_or(&options.default_language);
            return Ok(SynthesisResult {
                audio: RawAudio::empty(DEFAULT_SAMPLE_RATE),
                timeline: Vec::new(),
                language: normalize_language_code(language),
                voice: None,
                engine: None,
                segments: Vec::new(),
            });
        }

        let resolved = self.resolver().resolve(segments, options).await?;
        let engine = resolved.engine.as_ref();
        let options = resolved.options.as_ref();
        let language = resolved.language.as_str();
        let split = options.split_to_sentences || engine.capabilities().requires_sentence_split;

        let postprocessor = Postprocessor {
            options,
            aligner: self.aligner.as_ref(),
        };

        let mut assembler = TimelineAssembler::new();
        let mut segment_outputs = Vec::with_capacity(segments.len());
        let mut peak_so_far = f64::NEG_INFINITY;
        let mut sample_rate = DEFAULT_SAMPLE_RATE;

        for (segment_index, segment) in segments.iter().enumerate() {
            let sentences = decompose_segment(
                segment,
                options.ssml,
                split,
                self.splitter.as_ref(),
                language,
            );
            debug!(segment_index, sentences = sentences.len(), "Synthesizing segment");
            assembler.begin_segment(segment.trim());

            let mut sentence_audio = Vec::with_capacity(sentences.len());
            for (sentence_index, sentence) in sentences.iter().enumerate() {
                cancel.checkpoint().await?;

                let (audio, words) = if sentence.is_empty() {
                    (RawAudio::empty(sample_rate), Vec::new())
                } else {
                    let output = dispatch(
                        engine,
                        self.packages.as_ref(),
                        sentence,
                        &resolved.voice,
                        language,
                        options,
                        options.ssml,
                    )
                    .await?;

                    let (time_factor, pitch_factor) = time_pitch_factors(options, &output);
                    let processed = postprocessor
                        .run(
                            &PostprocessStage::sentence(time_factor, pitch_factor),
                            output.audio,
                            output.timeline,
                            Some(&AlignmentSource {
                                text: sentence,
                                is_ssml: options.ssml,
                                language,
                            }),
                        )
                        .await?;

                    let pause = if sentence_index + 1 == sentences.len() {
                        options.segment_end_pause
                    } else {
                        options.sentence_end_pause
                    };
                    let audio = trim_audio_end(
                        &processed.audio,
                        pause,
                        options.post_processing.trim_silence_threshold,
                    );
                    sample_rate = audio.sample_rate;
                    (audio, processed.timeline)
                };

                assembler.add_sentence(sentence.as_str(), audio.duration(), &words);
                if !audio.is_empty() {
                    peak_so_far = peak_so_far.max(peak_decibels(&audio));
                }

                if let Some(events) = events {
                    let _ = events.send(SynthesisEvent::Sentence(SentenceEvent {
                        segment_index,
                        index: sentence_index,
                        total: sentences.len(),
                        text: sentence.clone(),
                        audio: audio.clone(),
                        timeline: words,
                        language: language.to_string(),
                        peak_decibels_so_far: peak_so_far,
                    }));
                }
                sentence_audio.push(audio);
            }

            let processed = postprocessor
                .run(
                    &PostprocessStage::segment(),
                    RawAudio::concat(&sentence_audio, sample_rate),
                    None,
                    None,
                )
                .await?;
            let Some(timelines) = assembler.finish_segment() else {
                return Err(SynthesisError::Internal(anyhow::anyhow!(
                    "segment {segment_index} was not open"
                )));
            };

            if let Some(events) = events {
                let _ = events.send(SynthesisEvent::Segment(SegmentEvent {
                    index: segment_index,
                    total: segments.len(),
                    text: segment.trim().to_string(),
                    audio: processed.audio.clone(),
                    timeline: timelines.relative.timeline.clone(),
                    language: language.to_string(),
                    peak_decibels_so_far: peak_so_far,
                }));
            }

            segment_outputs.push(SegmentOutput {
                text: segment.trim().to_string(),
                audio: processed.audio,
                timeline: retain_words(&timelines.relative.timeline),
            });
        }

        let segment_audio: Vec<RawAudio> = segment_outputs.iter().map(|s| s.audio.clone()).collect();
        let processed = postprocessor
            .run(
                &PostprocessStage::final_result(),
                RawAudio::concat(&segment_audio, DEFAULT_SAMPLE_RATE),
                Some(assembler.into_timeline()),
                None,
            )
            .await?;

        info!(
            engine = %engine.name(),
            segments = segments.len(),
            duration = processed.audio.duration(),
            "Synthesis complete"
        );

        Ok(SynthesisResult {
            audio: processed.audio,
            timeline: processed.timeline,
            language: resolved.language.clone(),
            voice: Some(resolved.voice.clone()),
            engine: Some(engine.name().to_string()),
            segments: segment_outputs,
        })
    }
}
