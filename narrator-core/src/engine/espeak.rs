//! espeak-ng through its command line executable.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::params::{espeak_pitch, espeak_rate};
use super::provider::{EngineCapabilities, EngineOutput, EngineRequest, SynthesisEngine};
use crate::audio::wav::decode_wav;
use crate::audio::{pcm16le_to_f32, RawAudio};
use crate::error::SynthesisError;
use crate::settings::SynthesisOptions;
use crate::voice::{SynthesisVoice, VoiceGender};

pub const ENGINE_NAME: &str = "espeak";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EspeakOptions {
    #[serde(default = "default_executable")]
    pub executable: String,
}

fn default_executable() -> String {
    "espeak-ng".to_string()
}

impl Default for EspeakOptions {
    fn default() -> Self {
        Self {
            executable: default_executable(),
        }
    }
}

#[derive(Debug, Default)]
pub struct EspeakEngine;

impl EspeakEngine {
    pub fn new() -> Self {
        Self
    }
}

/// espeak-ng cannot seek stdout, so the header of streamed WAV output carries
/// placeholder sizes that strict readers reject. Fall back to reading the
/// canonical 44-byte header fields directly.
fn decode_streamed_wav(bytes: &[u8]) -> Result<RawAudio> {
    if let Ok(audio) = decode_wav(bytes) {
        return Ok(audio);
    }
    if bytes.len() < 44 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        bail!("espeak-ng produced no WAV output");
    }
    let sample_rate = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
    Ok(RawAudio::mono(pcm16le_to_f32(&bytes[44..]), sample_rate))
}

/// Parses the table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
///  5  en-gb           --/M      English_(Great_Britain) gmw/en            (en 2)
/// ```
pub fn parse_voice_list(output: &str) -> Vec<SynthesisVoice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 4 {
                return None;
            }
            let language = columns[1];
            let gender = match columns[2].rsplit('/').next() {
                Some("M") => VoiceGender::Male,
                Some("F") => VoiceGender::Female,
                _ => VoiceGender::Unknown,
            };

            let mut languages = vec![language.to_string()];
            let short = language.split('-').next().unwrap_or(language);
            if short != language {
                languages.push(short.to_string());
            }
            Some(SynthesisVoice {
                name: language.to_string(),
                languages,
                gender,
                speaker_count: None,
                package: None,
            })
        })
        .collect()
}

#[async_trait]
impl SynthesisEngine for EspeakEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_ssml: true,
            ..Default::default()
        }
    }

    async fn list_voices(&self, options: &SynthesisOptions) -> Result<Vec<SynthesisVoice>> {
        let config: EspeakOptions = options.engine_options(ENGINE_NAME);
        let output = Command::new(&config.executable)
            .arg("--voices")
            .output()
            .await
            .with_context(|| format!("Failed to run {}", config.executable))?;
        if !output.status.success() {
            bail!(
                "{} --voices failed: {}",
                config.executable,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn synthesize(&self, request: EngineRequest<'_>) -> Result<EngineOutput, SynthesisError> {
        let config: EspeakOptions = request.options.engine_options(ENGINE_NAME);
        let mut command = Command::new(&config.executable);
        command
            .arg("--stdout")
            .args(["-v", &request.voice.name])
            .args(["-s", &espeak_rate(request.options.speed).to_string()])
            .args(["-p", &espeak_pitch(request.options.pitch).to_string()]);
        if request.is_ssml {
            command.arg("-m");
        }
        command.arg("--").arg(request.text);

        debug!(voice = %request.voice.name, "Running espeak-ng");
        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to run {}", config.executable))
            .map_err(SynthesisError::Backend)?;
        if !output.status.success() {
            return Err(SynthesisError::Backend(anyhow::anyhow!(
                "espeak-ng exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let audio = decode_streamed_wav(&output.stdout).map_err(SynthesisError::Backend)?;
        Ok(EngineOutput::new(audio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_voice_table() {
        let output = "Pty Language       Age/Gender VoiceName          File                 Other Languages\n \
                      5  af              --/M      Afrikaans          gmw/af\n \
                      5  en-gb           --/F      English_(Great_Britain) gmw/en    (en 2)\n";
        let voices = parse_voice_list(output);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].name, "af");
        assert_eq!(voices[0].gender, VoiceGender::Male);
        assert_eq!(voices[1].languages, vec!["en-gb", "en"]);
        assert!(voices[1].declares_language("en-GB"));
    }

    #[test]
    fn decodes_streamed_header() {
        let mut bytes = b"RIFF\xff\xff\xff\x7fWAVEfmt ".to_vec();
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&22050u32.to_le_bytes());
        bytes.extend_from_slice(&44100u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data\xff\xff\xff\x7f");
        bytes.extend_from_slice(&[0, 0, 0, 64]);

        let audio = decode_streamed_wav(&bytes).unwrap();
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.samples(), &[0.0, 0.5]);
    }

    #[tokio::test]
    #[ignore = "requires espeak-ng on PATH"]
    async fn lists_installed_voices() {
        let voices = EspeakEngine::new()
            .list_voices(&SynthesisOptions::default())
            .await
            .unwrap();
        assert!(!voices.is_empty());
    }
}
