use anyhow::{Context, Result};
use rubato::{FftFixedIn, Resampler};

use super::{map_channels, output_len, validate_factors, wsola_stretch, TimePitchShifter};
use crate::audio::RawAudio;

/// WSOLA time stretch, then FFT resampling through `rubato` to move pitch.
#[derive(Debug, Default, Clone, Copy)]
pub struct RubatoShifter;

/// Resample `samples` from `source_rate` to `target_rate`, compensating the
/// resampler delay and returning exactly `expected_len` samples.
fn resample(
    samples: &[f32],
    source_rate: usize,
    target_rate: usize,
    expected_len: usize,
) -> Result<Vec<f32>> {
    let chunk_size = 1024;
    let mut resampler = FftFixedIn::<f32>::new(source_rate, target_rate, chunk_size, 2, 1)
        .context("failed to create resampler")?;

    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected_len + delay);
    let mut pos = 0;

    // Keep feeding silence after the input runs out until the delayed tail
    // has been flushed.
    while output.len() < expected_len + delay {
        let frames_needed = resampler.input_frames_next();
        let end = (pos + frames_needed).min(samples.len());

        let mut input_chunk = samples[pos.min(end)..end].to_vec();
        if input_chunk.len() < frames_needed {
            input_chunk.resize(frames_needed, 0.0);
        }

        let input = vec![input_chunk];
        let resampled = resampler
            .process(&input, None)
            .map_err(|e| anyhow::anyhow!("resampling failed: {e:?}"))?;
        if let Some(chunk) = resampled.into_iter().next() {
            output.extend(chunk);
        }
        pos = end;
    }

    Ok(output[delay..delay + expected_len].to_vec())
}

impl TimePitchShifter for RubatoShifter {
    fn stretch_time_pitch(
        &self,
        audio: &RawAudio,
        time_factor: f64,
        pitch_factor: f64,
    ) -> Result<RawAudio> {
        validate_factors(time_factor, pitch_factor)?;
        let target = output_len(audio.len(), time_factor);

        map_channels(audio, |samples| {
            if pitch_factor == 1.0 || samples.is_empty() || target == 0 {
                return Ok(wsola_stretch(samples, audio.sample_rate, target));
            }
            let intermediate = (samples.len() as f64 * pitch_factor / time_factor).round() as usize;
            let stretched = wsola_stretch(samples, audio.sample_rate, intermediate);

            // Treat the stretched signal as recorded at rate * pitch. The rate
            // is kept on a 100 Hz grid so the FFT sizes stay small.
            let source_rate =
                ((audio.sample_rate as f64 * pitch_factor / 100.0).round() as usize).max(1) * 100;
            resample(&stretched, source_rate, audio.sample_rate as usize, target)
        })
    }
}
