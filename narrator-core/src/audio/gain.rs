use super::RawAudio;

pub fn gain_to_decibels(gain: f64) -> f64 {
    if gain <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

pub fn decibels_to_gain(decibels: f64) -> f64 {
    10f64.powf(decibels / 20.0)
}

/// Absolute peak over all channels
pub fn peak_amplitude(audio: &RawAudio) -> f32 {
    audio
        .channels
        .iter()
        .flat_map(|c| c.iter())
        .map(|x| x.abs())
        .fold(0.0f32, f32::max)
}

/// Peak level in dBFS; negative infinity for silence.
pub fn peak_decibels(audio: &RawAudio) -> f64 {
    gain_to_decibels(peak_amplitude(audio) as f64)
}

pub fn apply_gain_decibels(audio: &RawAudio, decibels: f64) -> RawAudio {
    let gain = decibels_to_gain(decibels) as f32;
    RawAudio {
        channels: audio
            .channels
            .iter()
            .map(|c| c.iter().map(|s| s * gain).collect())
            .collect(),
        sample_rate: audio.sample_rate,
    }
}

/// Scale audio so its peak reaches `target_peak_db`, amplifying by at most
/// `max_increase_db`. Attenuation is never limited, so the result's peak never
/// exceeds the target.
pub fn normalize_peak(audio: &RawAudio, target_peak_db: f64, max_increase_db: f64) -> RawAudio {
    let current = peak_decibels(audio);
    if !current.is_finite() {
        return audio.clone();
    }
    let gain_db = (target_peak_db - current).min(max_increase_db.max(0.0));
    apply_gain_decibels(audio, gain_db)
}
