use tracing::debug;

use crate::alignment::Aligner;
use crate::audio::gain::normalize_peak;
use crate::audio::trim::trim_audio_start;
use crate::audio::RawAudio;
use crate::dsp::shifter_for;
use crate::engine::EngineOutput;
use crate::error::SynthesisError;
use crate::settings::SynthesisOptions;
use crate::text::ssml_to_plain_text;
use crate::timeline::{has_words, offset_timeline, retain_words, scale_timeline, Timeline};

/// Which postprocessing steps run, in their fixed order: downmix, normalize,
/// leading trim, alignment fallback, time/pitch shift, word filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostprocessStage {
    pub downmix: bool,
    pub normalize: bool,
    pub trim_leading_silence: bool,
    pub align_missing_timeline: bool,
    pub time_factor: f64,
    pub pitch_factor: f64,
    pub filter_words: bool,
}

impl PostprocessStage {
    /// Per sentence, right after the engine call. No normalization.
    pub fn sentence(time_factor: f64, pitch_factor: f64) -> Self {
        Self {
            downmix: true,
            normalize: false,
            trim_leading_silence: true,
            align_missing_timeline: true,
            time_factor,
            pitch_factor,
            filter_words: false,
        }
    }

    /// On the concatenated audio of one segment.
    pub fn segment() -> Self {
        Self {
            downmix: true,
            normalize: true,
            trim_leading_silence: false,
            align_missing_timeline: false,
            time_factor: 1.0,
            pitch_factor: 1.0,
            filter_words: false,
        }
    }

    /// On the whole result, once.
    pub fn final_result() -> Self {
        Self {
            filter_words: true,
            ..Self::segment()
        }
    }

    fn shifts(&self) -> bool {
        self.time_factor != 1.0 || self.pitch_factor != 1.0
    }
}

/// Time and pitch factors the postprocessor applies to an engine's output:
/// an explicit postprocessing value wins, otherwise the requested speed/pitch
/// when the engine did not apply it, otherwise no change.
pub fn time_pitch_factors(options: &SynthesisOptions, output: &EngineOutput) -> (f64, f64) {
    let post = &options.post_processing;
    let time = post.speed.unwrap_or(if output.should_postprocess_speed {
        options.speed
    } else {
        1.0
    });
    let pitch = post.pitch.unwrap_or(if output.should_postprocess_pitch {
        options.pitch
    } else {
        1.0
    });
    (time, pitch)
}

/// Text the alignment fallback runs against.
pub struct AlignmentSource<'a> {
    pub text: &'a str,
    pub is_ssml: bool,
    pub language: &'a str,
}

#[derive(Debug, Clone)]
pub struct Processed {
    pub audio: RawAudio,
    pub timeline: Timeline,
}

pub struct Postprocessor<'a> {
    pub options: &'a SynthesisOptions,
    pub aligner: &'a dyn Aligner,
}

impl<'a> Postprocessor<'a> {
    pub async fn run(
        &self,
        stage: &PostprocessStage,
        audio: RawAudio,
        timeline: Option<Timeline>,
        source: Option<&AlignmentSource<'_>>,
    ) -> Result<Processed, SynthesisError> {
        let post = &self.options.post_processing;
        let mut audio = audio;
        let mut timeline = timeline;

        if stage.downmix {
            audio = audio.downmix_to_mono();
        }

        if stage.normalize && post.normalize_audio {
            audio = normalize_peak(&audio, post.target_peak, post.max_gain_increase);
        }

        if stage.trim_leading_silence {
            let before = audio.duration();
            audio = trim_audio_start(&audio, post.trim_silence_threshold);
            let delta = audio.duration() - before;
            if delta != 0.0 {
                timeline = timeline.map(|t| offset_timeline(&t, delta));
            }
        }

        if stage.align_missing_timeline {
            if let Some(source) = source {
                timeline = Some(self.align(&audio, timeline, source).await?);
            }
        }

        if stage.shifts() {
            debug!(
                time_factor = stage.time_factor,
                pitch_factor = stage.pitch_factor,
                method = %post.time_pitch_method,
                "Applying time/pitch shift"
            );
            audio = shifter_for(post.time_pitch_method)
                .stretch_time_pitch(&audio, stage.time_factor, stage.pitch_factor)
                .map_err(SynthesisError::Internal)?;
            if stage.time_factor != 1.0 {
                timeline = timeline.map(|t| scale_timeline(&t, 1.0 / stage.time_factor));
            }
        }

        let mut timeline = timeline.unwrap_or_default();
        if stage.filter_words {
            timeline = retain_words(&timeline);
        }

        Ok(Processed { audio, timeline })
    }

    async fn align(
        &self,
        audio: &RawAudio,
        timeline: Option<Timeline>,
        source: &AlignmentSource<'_>,
    ) -> Result<Timeline, SynthesisError> {
        let alignment = &self.options.alignment;
        match timeline {
            Some(timeline) if has_words(&timeline) => Ok(timeline),
            Some(coarse) if !coarse.is_empty() => {
                debug!("Engine timeline has no words, aligning within its entries");
                let nested = self
                    .aligner
                    .align_segments(audio, &coarse, source.language, alignment)
                    .await
                    .map_err(SynthesisError::Internal)?;
                Ok(nested.into_iter().flat_map(|entry| entry.timeline).collect())
            }
            _ => {
                let text = if source.is_ssml {
                    ssml_to_plain_text(source.text)
                } else {
                    source.text.to_string()
                };
                if text.trim().is_empty() {
                    return Ok(Vec::new());
                }
                self.aligner
                    .align(audio, &text, source.language, alignment)
                    .await
                    .map_err(SynthesisError::Internal)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::ProportionalAligner;
    use crate::audio::gain::peak_decibels;
    use crate::timeline::{EntryKind, TimelineEntry};

    fn burst(lead: usize, body: usize, tail: usize, level: f32) -> RawAudio {
        let mut samples = vec![0.0; lead];
        samples.extend((0..body).map(|i| if i % 2 == 0 { level } else { -level }));
        samples.extend(std::iter::repeat(0.0).take(tail));
        RawAudio::mono(samples, 1000)
    }

    #[tokio::test]
    async fn leading_trim_shifts_timeline_by_removed_duration() {
        let options = SynthesisOptions::default();
        let processor = Postprocessor {
            options: &options,
            aligner: &ProportionalAligner,
        };
        let timeline = vec![
            TimelineEntry::word("one", 0.3, 0.6),
            TimelineEntry::word("two", 0.7, 0.9),
        ];

        let processed = processor
            .run(
                &PostprocessStage::sentence(1.0, 1.0),
                burst(250, 700, 50, 0.5),
                Some(timeline),
                None,
            )
            .await
            .unwrap();

        assert_eq!(processed.audio.len(), 750);
        assert!((processed.timeline[0].start_time - 0.05).abs() < 1e-9);
        assert!((processed.timeline[1].end_time - 0.65).abs() < 1e-9);
    }

    #[tokio::test]
    async fn stretch_rescales_timeline() {
        let mut options = SynthesisOptions::default();
        options.post_processing.speed = Some(2.0);
        let processor = Postprocessor {
            options: &options,
            aligner: &ProportionalAligner,
        };
        let output = EngineOutput::new(burst(0, 1000, 0, 0.5));
        let (time, pitch) = time_pitch_factors(&options, &output);
        assert_eq!((time, pitch), (2.0, 1.0));

        let processed = processor
            .run(
                &PostprocessStage::sentence(time, pitch),
                output.audio,
                Some(vec![TimelineEntry::word("hi", 0.2, 0.8)]),
                None,
            )
            .await
            .unwrap();

        assert_eq!(processed.audio.len(), 500);
        assert!((processed.timeline[0].start_time - 0.1).abs() < 1e-9);
        assert!((processed.timeline[0].end_time - 0.4).abs() < 1e-9);
    }

    #[test]
    fn deferred_speed_uses_requested_values() {
        let options = SynthesisOptions {
            speed: 1.5,
            pitch: 0.8,
            ..Default::default()
        };
        let plain = EngineOutput::new(RawAudio::empty(1000));
        assert_eq!(time_pitch_factors(&options, &plain), (1.0, 1.0));

        let deferred = EngineOutput::new(RawAudio::empty(1000)).postprocess_speed_and_pitch();
        assert_eq!(time_pitch_factors(&options, &deferred), (1.5, 0.8));
    }

    #[tokio::test]
    async fn missing_timeline_is_aligned() {
        let options = SynthesisOptions::default();
        let processor = Postprocessor {
            options: &options,
            aligner: &ProportionalAligner,
        };
        let source = AlignmentSource {
            text: "<speak>Hello <break/> world</speak>",
            is_ssml: true,
            language: "en",
        };

        let processed = processor
            .run(
                &PostprocessStage::sentence(1.0, 1.0),
                burst(100, 800, 100, 0.5),
                None,
                Some(&source),
            )
            .await
            .unwrap();

        let words: Vec<&str> = processed.timeline.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(words, vec!["Hello", "world"]);
        assert_eq!(processed.timeline[0].start_time, 0.0);
    }

    #[tokio::test]
    async fn coarse_timeline_gets_words() {
        let options = SynthesisOptions::default();
        let processor = Postprocessor {
            options: &options,
            aligner: &ProportionalAligner,
        };
        let source = AlignmentSource {
            text: "Good night",
            is_ssml: false,
            language: "en",
        };
        let coarse = vec![TimelineEntry::new(EntryKind::Sentence, "Good night", 0.0, 1.0)];

        let processed = processor
            .run(
                &PostprocessStage::sentence(1.0, 1.0),
                burst(0, 1000, 0, 0.5),
                Some(coarse),
                Some(&source),
            )
            .await
            .unwrap();

        assert_eq!(processed.timeline.len(), 2);
        assert!(processed.timeline.iter().all(|e| e.kind == EntryKind::Word));
    }

    #[tokio::test]
    async fn normalization_respects_gain_ceiling() {
        let mut options = SynthesisOptions::default();
        options.post_processing.max_gain_increase = 6.0;
        let processor = Postprocessor {
            options: &options,
            aligner: &ProportionalAligner,
        };

        let quiet = burst(0, 100, 0, 0.01);
        let before = peak_decibels(&quiet);
        let processed = processor
            .run(&PostprocessStage::segment(), quiet, None, None)
            .await
            .unwrap();
        let after = peak_decibels(&processed.audio);
        assert!((after - before - 6.0).abs() < 1e-3);

        let loud = burst(0, 100, 0, 1.0);
        let processed = processor
            .run(&PostprocessStage::segment(), loud, None, None)
            .await
            .unwrap();
        assert!(peak_decibels(&processed.audio) <= -3.0 + 1e-3);
    }

    #[tokio::test]
    async fn final_stage_drops_punctuation_entries() {
        let options = SynthesisOptions::default();
        let processor = Postprocessor {
            options: &options,
            aligner: &ProportionalAligner,
        };
        let timeline = vec![TimelineEntry::new(EntryKind::Segment, "Hi!", 0.0, 1.0).with_children(vec![
            TimelineEntry::word("Hi", 0.0, 0.5),
            TimelineEntry::word("!", 0.5, 0.6),
            TimelineEntry::word(" ", 0.6, 0.7),
        ])];

        let processed = processor
            .run(
                &PostprocessStage::final_result(),
                burst(0, 1000, 0, 0.5),
                Some(timeline),
                None,
            )
            .await
            .unwrap();
        assert_eq!(processed.timeline[0].timeline.len(), 1);
    }
}
