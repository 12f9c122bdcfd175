use anyhow::Result;

use super::{map_channels, output_len, validate_factors, wsola_stretch, TimePitchShifter};
use crate::audio::{stretch_linear, RawAudio};

/// WSOLA time stretch, then linear interpolation to move pitch.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverlapAddShifter;

impl TimePitchShifter for OverlapAddShifter {
    fn stretch_time_pitch(
        &self,
        audio: &RawAudio,
        time_factor: f64,
        pitch_factor: f64,
    ) -> Result<RawAudio> {
        validate_factors(time_factor, pitch_factor)?;
        let target = output_len(audio.len(), time_factor);

        map_channels(audio, |samples| {
            if pitch_factor == 1.0 {
                return Ok(wsola_stretch(samples, audio.sample_rate, target));
            }
            // Stretch to target * pitch, then squeeze back to target, which
            // raises pitch by the same ratio.
            let intermediate = (samples.len() as f64 * pitch_factor / time_factor).round() as usize;
            let stretched = wsola_stretch(samples, audio.sample_rate, intermediate);
            Ok(stretch_linear(&stretched, target))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count()
    }

    fn sine(freq: f32, len: usize, rate: u32) -> RawAudio {
        RawAudio::mono(
            (0..len)
                .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
                .collect(),
            rate,
        )
    }

    #[test]
    fn time_stretch_keeps_pitch() {
        let audio = sine(200.0, 16000, 16000);
        let slower = OverlapAddShifter.stretch_time_pitch(&audio, 0.5, 1.0).unwrap();
        assert_eq!(slower.len(), 32000);

        // Twice the duration at the same frequency: about twice the crossings
        let ratio = zero_crossings(slower.samples()) as f64 / zero_crossings(audio.samples()) as f64;
        assert!((ratio - 2.0).abs() < 0.15, "ratio {ratio}");
    }

    #[test]
    fn pitch_shift_keeps_duration() {
        let audio = sine(200.0, 16000, 16000);
        let higher = OverlapAddShifter.stretch_time_pitch(&audio, 1.0, 1.5).unwrap();
        assert_eq!(higher.len(), 16000);

        let ratio = zero_crossings(higher.samples()) as f64 / zero_crossings(audio.samples()) as f64;
        assert!((ratio - 1.5).abs() < 0.15, "ratio {ratio}");
    }

    #[test]
    fn identity_is_lossless() {
        let audio = sine(200.0, 1000, 16000);
        let same = OverlapAddShifter.stretch_time_pitch(&audio, 1.0, 1.0).unwrap();
        assert_eq!(same, audio);
    }
}
