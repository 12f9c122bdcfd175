//! WAV encoding/decoding through `hound`.

use anyhow::{bail, Context, Result};
use std::io::Cursor;
use std::path::Path;

use super::RawAudio;

/// Encode as 16-bit PCM WAV.
pub fn encode_wav(audio: &RawAudio) -> Result<Vec<u8>> {
    let channel_count = audio.channels.len().max(1);
    let spec = hound::WavSpec {
        channels: channel_count as u16,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
        for i in 0..audio.len() {
            for channel in &audio.channels {
                let sample = (channel[i].clamp(-1.0, 1.0) * 32767.0) as i16;
                writer.write_sample(sample)?;
            }
        }
        writer.finalize().context("Failed to finalize WAV data")?;
    }
    Ok(cursor.into_inner())
}

pub fn write_wav_file(audio: &RawAudio, path: &Path) -> Result<()> {
    let bytes = encode_wav(audio)?;
    std::fs::write(path, bytes).with_context(|| format!("Failed to write WAV file {path:?}"))
}

/// Decode WAV bytes (integer or float samples) into deinterleaved channels.
pub fn decode_wav(bytes: &[u8]) -> Result<RawAudio> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).context("Failed to parse WAV data")?;
    let spec = reader.spec();
    let channel_count = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => match spec.bits_per_sample {
            8 => reader
                .into_samples::<i8>()
                .map(|s| s.map(|v| v as f32 / 128.0))
                .collect::<Result<_, _>>()?,
            16 => reader
                .into_samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<Result<_, _>>()?,
            24 | 32 => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
            bits => bail!("Unsupported bit depth: {bits}"),
        },
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
    };

    let mut channels = vec![Vec::with_capacity(interleaved.len() / channel_count); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, sample) in channels.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }
    RawAudio::new(channels, spec.sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_preserves_length_and_rate() {
        let audio = RawAudio::mono((0..480).map(|i| (i as f32 / 480.0) - 0.5).collect(), 22050);
        let decoded = decode_wav(&encode_wav(&audio).unwrap()).unwrap();
        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.len(), 480);
        for (a, b) in audio.samples().iter().zip(decoded.samples()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_wav(b"definitely not a wav file").is_err());
    }
}
