use super::gain::decibels_to_gain;
use super::{seconds_to_samples, RawAudio};

fn threshold(threshold_db: f64) -> f32 {
    decibels_to_gain(threshold_db) as f32
}

/// Index of the first sample louder than the threshold in any channel.
pub fn first_audible_sample(audio: &RawAudio, threshold_db: f64) -> Option<usize> {
    let limit = threshold(threshold_db);
    (0..audio.len()).find(|&i| audio.channels.iter().any(|c| c[i].abs() > limit))
}

/// Index of the last sample louder than the threshold in any channel.
pub fn last_audible_sample(audio: &RawAudio, threshold_db: f64) -> Option<usize> {
    let limit = threshold(threshold_db);
    (0..audio.len())
        .rev()
        .find(|&i| audio.channels.iter().any(|c| c[i].abs() > limit))
}

/// Remove leading silence. Fully silent audio trims to empty.
pub fn trim_audio_start(audio: &RawAudio, threshold_db: f64) -> RawAudio {
    match first_audible_sample(audio, threshold_db) {
        Some(0) => audio.clone(),
        Some(start) => audio.slice(start, audio.len()),
        None => audio.slice(0, 0),
    }
}

/// Remove trailing silence and re-pad with exactly `pause_seconds` of silence.
pub fn trim_audio_end(audio: &RawAudio, pause_seconds: f64, threshold_db: f64) -> RawAudio {
    let end = last_audible_sample(audio, threshold_db)
        .map(|i| i + 1)
        .unwrap_or(0);
    let pause = seconds_to_samples(pause_seconds, audio.sample_rate);
    RawAudio {
        channels: audio
            .channels
            .iter()
            .map(|c| {
                let mut trimmed = c[..end].to_vec();
                trimmed.resize(end + pause, 0.0);
                trimmed
            })
            .collect(),
        sample_rate: audio.sample_rate,
    }
}
