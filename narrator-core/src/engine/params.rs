//! Engine-specific numeric parameter translation.

use crate::voice::VoiceGender;

/// Length scale for time-domain neural engines: larger is slower.
pub fn length_scale(speed: f64) -> f64 {
    1.0 / speed
}

/// SSML prosody rate, e.g. `+25%` or `-50%`.
pub fn ssml_rate(speed: f64) -> String {
    if speed >= 1.0 {
        format!("+{}%", ((speed - 1.0) * 100.0).floor() as i64)
    } else {
        format!("-{}%", ((1.0 / speed - 1.0) * 100.0).floor() as i64)
    }
}

/// Rough fundamental frequency of a voice, used to express relative pitch in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchBase(pub f64);

impl PitchBase {
    pub fn for_gender(gender: VoiceGender) -> Self {
        match gender {
            VoiceGender::Male => Self(120.0),
            VoiceGender::Female => Self(210.0),
            VoiceGender::Unknown => Self(165.0),
        }
    }

    pub fn hz(&self) -> f64 {
        self.0
    }
}

/// SSML prosody pitch relative to the voice's estimated f0, e.g. `+12Hz`.
pub fn ssml_pitch(pitch: f64, gender: VoiceGender) -> String {
    let f0 = PitchBase::for_gender(gender).hz();
    let delta = ((pitch * f0).floor() - f0) as i64;
    if delta >= 0 {
        format!("+{delta}Hz")
    } else {
        format!("{delta}Hz")
    }
}

/// espeak words-per-minute for a speed factor.
pub fn espeak_rate(speed: f64) -> u32 {
    (175.0 * speed).round().max(1.0) as u32
}

/// espeak pitch (0..=99) for a pitch factor.
pub fn espeak_pitch(pitch: f64) -> u32 {
    (50.0 * pitch).round().clamp(0.0, 99.0) as u32
}
