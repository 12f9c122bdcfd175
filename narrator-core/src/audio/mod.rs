//! Raw audio buffers and the sample-level operations the pipeline needs.
//!
//! The pipeline works on single-channel `f32` audio throughout; multi-channel
//! buffers only appear at the backend boundary and are downmixed immediately.

pub mod gain;
pub mod trim;
pub mod wav;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Sample rate used when nothing has been synthesized yet.
pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

/// One or more equal-length channels of `f32` samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAudio {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl RawAudio {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            bail!("sample rate must be positive");
        }
        if let Some(first) = channels.first() {
            let len = first.len();
            if channels.iter().any(|c| c.len() != len) {
                bail!("all channels must have the same length");
            }
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    pub fn empty(sample_rate: u32) -> Self {
        Self::mono(Vec::new(), sample_rate)
    }

    pub fn silence(seconds: f64, sample_rate: u32) -> Self {
        let count = seconds_to_samples(seconds, sample_rate);
        Self::mono(vec![0.0; count], sample_rate)
    }

    /// Number of samples per channel
    pub fn len(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Samples of the first channel. After downmixing this is the whole signal.
    pub fn samples(&self) -> &[f32] {
        self.channels.first().map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// Average all channels into one.
    pub fn downmix_to_mono(&self) -> RawAudio {
        match self.channels.len() {
            0 => RawAudio::empty(self.sample_rate),
            1 => self.clone(),
            count => {
                let len = self.len();
                let mut mixed = vec![0.0f32; len];
                for channel in &self.channels {
                    for (out, sample) in mixed.iter_mut().zip(channel) {
                        *out += *sample;
                    }
                }
                let scale = 1.0 / count as f32;
                mixed.iter_mut().for_each(|s| *s *= scale);
                RawAudio::mono(mixed, self.sample_rate)
            }
        }
    }

    /// Sample range `[start, end)` of every channel, clamped to the buffer.
    pub fn slice(&self, start: usize, end: usize) -> RawAudio {
        let len = self.len();
        let end = end.min(len);
        let start = start.min(end);
        RawAudio {
            channels: self
                .channels
                .iter()
                .map(|c| c[start..end].to_vec())
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Concatenate parts into one mono buffer.
    ///
    /// The output rate is the rate of the first non-empty part; parts at a
    /// different rate are resampled to it. When every part is empty the result
    /// is empty audio at `fallback_rate`.
    pub fn concat(parts: &[RawAudio], fallback_rate: u32) -> RawAudio {
        let Some(rate) = parts.iter().find(|p| !p.is_empty()).map(|p| p.sample_rate) else {
            return RawAudio::empty(fallback_rate);
        };

        let total: usize = parts.iter().map(|p| p.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for part in parts.iter().filter(|p| !p.is_empty()) {
            let mono = part.downmix_to_mono();
            if mono.sample_rate == rate {
                samples.extend_from_slice(mono.samples());
            } else {
                samples.extend(resample_linear(mono.samples(), mono.sample_rate, rate));
            }
        }
        RawAudio::mono(samples, rate)
    }
}

pub fn seconds_to_samples(seconds: f64, sample_rate: u32) -> usize {
    (seconds.max(0.0) * sample_rate as f64).round() as usize
}

/// Linear-interpolation resampling. Cheap, and good enough for joining
/// speech produced at slightly different rates.
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let target_len =
        ((samples.len() as f64) * target_rate as f64 / source_rate as f64).round() as usize;
    stretch_linear(samples, target_len)
}

/// Resize `samples` to exactly `target_len` samples by linear interpolation.
pub fn stretch_linear(samples: &[f32], target_len: usize) -> Vec<f32> {
    if samples.is_empty() || target_len == 0 {
        return vec![0.0; target_len];
    }
    if samples.len() == 1 {
        return vec![samples[0]; target_len];
    }
    let step = (samples.len() - 1) as f64 / (target_len.max(2) - 1) as f64;
    (0..target_len)
        .map(|i| {
            let pos = i as f64 * step;
            let index = pos.floor() as usize;
            let frac = (pos - index as f64) as f32;
            let a = samples[index.min(samples.len() - 1)];
            let b = samples[(index + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Decode little-endian signed 16-bit PCM into `f32` samples.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            sample as f32 / 32768.0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_ragged_channels() {
        assert!(RawAudio::new(vec![vec![0.0; 3], vec![0.0; 2]], 16000).is_err());
        assert!(RawAudio::new(vec![vec![0.0; 3], vec![0.0; 3]], 16000).is_ok());
    }

    #[test]
    fn downmix_averages_channels() {
        let audio = RawAudio::new(vec![vec![1.0, 0.5], vec![0.0, -0.5]], 8000).unwrap();
        let mono = audio.downmix_to_mono();
        assert_eq!(mono.channels.len(), 1);
        assert_eq!(mono.samples(), &[0.5, 0.0]);
    }

    #[test]
    fn concat_preserves_total_duration() {
        let a = RawAudio::mono(vec![0.1; 24000], 24000);
        let b = RawAudio::mono(vec![0.2; 12000], 24000);
        let joined = RawAudio::concat(&[a.clone(), b.clone()], DEFAULT_SAMPLE_RATE);
        assert!((joined.duration() - (a.duration() + b.duration())).abs() < 1e-9);
    }

    #[test]
    fn concat_of_nothing_uses_fallback_rate() {
        let joined = RawAudio::concat(&[], DEFAULT_SAMPLE_RATE);
        assert!(joined.is_empty());
        assert_eq!(joined.sample_rate, 24000);
    }

    #[test]
    fn concat_resamples_mismatched_rates() {
        let a = RawAudio::mono(vec![0.0; 24000], 24000);
        let b = RawAudio::mono(vec![0.0; 16000], 16000);
        let joined = RawAudio::concat(&[a, b], DEFAULT_SAMPLE_RATE);
        assert_eq!(joined.sample_rate, 24000);
        assert_eq!(joined.len(), 48000);
    }

    #[test]
    fn pcm16_decoding() {
        let bytes = [0x00, 0x40, 0x00, 0xC0];
        assert_eq!(pcm16le_to_f32(&bytes), vec![0.5, -0.5]);
    }
}
