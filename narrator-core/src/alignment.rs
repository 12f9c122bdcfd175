//! Word timing for engines that return none.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::audio::trim::{first_audible_sample, last_audible_sample};
use crate::audio::{seconds_to_samples, RawAudio};
use crate::settings::AlignmentOptions;
use crate::timeline::{is_word_text, Timeline, TimelineEntry};

/// Forced-alignment collaborator. Timelines are relative to the start of
/// `audio`.
#[async_trait]
pub trait Aligner: Send + Sync {
    /// Flat word timeline for `text` spoken in `audio`.
    async fn align(
        &self,
        audio: &RawAudio,
        text: &str,
        language: &str,
        options: &AlignmentOptions,
    ) -> Result<Timeline>;

    /// Aligns each coarse entry's text within its own time window and nests
    /// the resulting words under it.
    async fn align_segments(
        &self,
        audio: &RawAudio,
        segment_timeline: &[TimelineEntry],
        language: &str,
        options: &AlignmentOptions,
    ) -> Result<Timeline>;
}

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+(?:['’\-]\w+)*|[^\w\s]+").unwrap());

/// Spreads the voiced span of the audio over the text's tokens in proportion
/// to their length. Punctuation tokens get a small share so they keep their
/// place in the token order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProportionalAligner;

impl ProportionalAligner {
    fn align_window(
        audio: &RawAudio,
        text: &str,
        options: &AlignmentOptions,
    ) -> Timeline {
        let tokens: Vec<&str> = TOKEN.find_iter(text).map(|m| m.as_str()).collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        let rate = audio.sample_rate as f64;
        let (start, end) = match (
            first_audible_sample(audio, options.silence_threshold),
            last_audible_sample(audio, options.silence_threshold),
        ) {
            (Some(first), Some(last)) => (first as f64 / rate, (last + 1) as f64 / rate),
            _ => (0.0, audio.duration()),
        };

        let weights: Vec<f64> = tokens
            .iter()
            .map(|token| {
                let chars = token.chars().count() as f64;
                if is_word_text(token) {
                    chars
                } else {
                    chars * options.punctuation_weight
                }
            })
            .collect();
        let total: f64 = weights.iter().sum();
        let span = end - start;

        let mut cursor = start;
        tokens
            .iter()
            .zip(&weights)
            .map(|(token, weight)| {
                let share = if total > 0.0 { span * weight / total } else { 0.0 };
                let entry = TimelineEntry::word(*token, cursor, (cursor + share).min(end));
                cursor += share;
                entry
            })
            .collect()
    }
}

#[async_trait]
impl Aligner for ProportionalAligner {
    async fn align(
        &self,
        audio: &RawAudio,
        text: &str,
        _language: &str,
        options: &AlignmentOptions,
    ) -> Result<Timeline> {
        Ok(Self::align_window(audio, text, options))
    }

    async fn align_segments(
        &self,
        audio: &RawAudio,
        segment_timeline: &[TimelineEntry],
        _language: &str,
        options: &AlignmentOptions,
    ) -> Result<Timeline> {
        let rate = audio.sample_rate;
        Ok(segment_timeline
            .iter()
            .map(|entry| {
                let from = seconds_to_samples(entry.start_time, rate).min(audio.len());
                let to = seconds_to_samples(entry.end_time, rate).clamp(from, audio.len());
                let window = audio.slice(from, to);
                let words = Self::align_window(&window, &entry.text, options)
                    .into_iter()
                    .map(|w| {
                        let start = (w.start_time + entry.start_time).min(entry.end_time);
                        let end = (w.end_time + entry.start_time).min(entry.end_time);
                        TimelineEntry::word(w.text, start, end)
                    })
                    .collect();
                entry.clone().with_children(words)
            })
            .collect())
    }
}
