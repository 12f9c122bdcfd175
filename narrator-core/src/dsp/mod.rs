//! Time stretching and pitch shifting.
//!
//! Both shifters run the same WSOLA time stretch. They differ in how the
//! stretched signal is resampled to move its pitch.

pub mod overlap_add;
pub mod rubato;

use anyhow::Result;

use crate::audio::RawAudio;
use crate::settings::TimePitchMethod;

pub use self::overlap_add::OverlapAddShifter;
pub use self::rubato::RubatoShifter;

pub trait TimePitchShifter: Send + Sync {
    /// Returns audio lasting `1 / time_factor` of the input with its pitch
    /// multiplied by `pitch_factor`. The output has exactly
    /// `round(len / time_factor)` samples.
    fn stretch_time_pitch(
        &self,
        audio: &RawAudio,
        time_factor: f64,
        pitch_factor: f64,
    ) -> Result<RawAudio>;
}

pub fn shifter_for(method: TimePitchMethod) -> Box<dyn TimePitchShifter> {
    match method {
        TimePitchMethod::OverlapAdd => Box::new(OverlapAddShifter),
        TimePitchMethod::Rubato => Box::new(RubatoShifter),
    }
}

pub(crate) fn validate_factors(time_factor: f64, pitch_factor: f64) -> Result<()> {
    if !(time_factor.is_finite() && time_factor > 0.0) {
        anyhow::bail!("Invalid time stretch factor {time_factor}");
    }
    if !(pitch_factor.is_finite() && pitch_factor > 0.0) {
        anyhow::bail!("Invalid pitch shift factor {pitch_factor}");
    }
    Ok(())
}

pub(crate) fn output_len(len: usize, time_factor: f64) -> usize {
    (len as f64 / time_factor).round() as usize
}

/// Runs `process` over every channel, rebuilding audio at the input rate.
pub(crate) fn map_channels<F>(audio: &RawAudio, mut process: F) -> Result<RawAudio>
where
    F: FnMut(&[f32]) -> Result<Vec<f32>>,
{
    let channels = audio
        .channels
        .iter()
        .map(|channel| process(channel))
        .collect::<Result<Vec<_>>>()?;
    RawAudio::new(channels, audio.sample_rate)
}

/// Waveform-similarity overlap-add time stretch of one channel to exactly
/// `target_len` samples, leaving pitch unchanged.
pub fn wsola_stretch(samples: &[f32], sample_rate: u32, target_len: usize) -> Vec<f32> {
    if samples.is_empty() || target_len == 0 {
        return vec![0.0; target_len];
    }
    if target_len == samples.len() {
        return samples.to_vec();
    }

    let frame = ((sample_rate as f64 * 0.040) as usize).max(4) & !1;
    let synthesis_hop = frame / 2;
    let tolerance = (sample_rate as f64 * 0.010) as isize;
    let analysis_hop = synthesis_hop as f64 * samples.len() as f64 / target_len as f64;

    let window: Vec<f32> = (0..frame)
        .map(|n| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / frame as f32).cos())
        .collect();
    let at = |i: isize| -> f32 {
        if i >= 0 && (i as usize) < samples.len() {
            samples[i as usize]
        } else {
            0.0
        }
    };

    let max_start = samples.len().saturating_sub(frame) as isize;
    let mut output = vec![0.0f32; target_len + frame];
    let mut norm = vec![0.0f32; target_len + frame];
    let mut previous: isize = 0;

    let mut k = 0usize;
    while k * synthesis_hop < target_len {
        let out_pos = k * synthesis_hop;
        let nominal = (k as f64 * analysis_hop).round() as isize;

        let position = if k == 0 {
            0
        } else {
            // The continuation of the previous frame is what the overlap
            // region should look like.
            let natural = previous + synthesis_hop as isize;
            let low = (nominal - tolerance).clamp(0, max_start);
            let high = (nominal + tolerance).clamp(0, max_start);
            let mut best = nominal.clamp(0, max_start);
            let mut best_score = f32::NEG_INFINITY;
            for candidate in low..=high {
                let score: f32 = (0..synthesis_hop as isize)
                    .map(|j| at(candidate + j) * at(natural + j))
                    .sum();
                if score > best_score {
                    best_score = score;
                    best = candidate;
                }
            }
            best
        };

        for n in 0..frame {
            output[out_pos + n] += window[n] * at(position + n as isize);
            norm[out_pos + n] += window[n];
        }
        previous = position;
        k += 1;
    }

    output.truncate(target_len);
    for (sample, weight) in output.iter_mut().zip(&norm) {
        if *weight > 1e-6 {
            *sample /= weight;
        }
    }
    output
}
