//! ElevenLabs text-to-speech

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use super::provider::{EngineCapabilities, EngineOutput, EngineRequest, SynthesisEngine};
use crate::audio::{pcm16le_to_f32, RawAudio};
use crate::error::SynthesisError;
use crate::settings::SynthesisOptions;
use crate::voice::{SynthesisVoice, VoiceGender};

pub const ENGINE_NAME: &str = "elevenlabs";

const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Languages of the multilingual model.
const LANGUAGES: &[&str] = &[
    "en", "de", "fr", "es", "it", "pt", "pl", "hi", "ar", "zh", "ja", "ko", "nl", "tr", "sv",
    "ru", "cs", "da", "fi", "el", "id", "ms", "ro", "uk", "bg", "hr", "sk", "ta", "fil",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevenLabsOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_model_id")]
    pub model_id: String,
}

fn default_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}

impl Default for ElevenLabsOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            model_id: default_model_id(),
        }
    }
}

impl ElevenLabsOptions {
    fn api_key(&self) -> Result<&str, SynthesisError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SynthesisError::configuration("ElevenLabs requires an api_key"))
    }
}

/// Voices are addressed by id on the API but selected by name, so listed
/// voices remember their ids.
pub struct ElevenLabsEngine {
    client: Client,
    voice_ids: Mutex<HashMap<String, String>>,
}

impl Default for ElevenLabsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ElevenLabsEngine {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            voice_ids: Mutex::new(HashMap::new()),
        }
    }

    fn cached_voice_id(&self, name: &str) -> Option<String> {
        self.voice_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    async fn fetch_voices(&self, api_key: &str) -> Result<Vec<VoiceData>> {
        let response = self
            .client
            .get("https://api.elevenlabs.io/v1/voices")
            .header("xi-api-key", api_key)
            .send()
            .await
            .context("Failed to list voices from ElevenLabs")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("ElevenLabs API error {status}: {body}");
        }

        let voices_response: VoicesResponse = response
            .json()
            .await
            .context("Failed to parse voices response")?;

        let mut ids = self
            .voice_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for voice in &voices_response.voices {
            ids.insert(voice.name.clone(), voice.voice_id.clone());
        }
        Ok(voices_response.voices)
    }

    /// Name to id; a name never seen in a listing is used as the id itself.
    async fn voice_id(&self, name: &str, api_key: &str) -> String {
        if let Some(id) = self.cached_voice_id(name) {
            return id;
        }
        if let Err(e) = self.fetch_voices(api_key).await {
            tracing::warn!("Failed to refresh ElevenLabs voice ids: {e:?}");
        }
        self.cached_voice_id(name).unwrap_or_else(|| name.to_string())
    }
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<VoiceData>,
}

#[derive(Deserialize)]
struct VoiceData {
    voice_id: String,
    name: String,
    #[serde(default)]
    labels: HashMap<String, String>,
}

impl From<VoiceData> for SynthesisVoice {
    fn from(data: VoiceData) -> Self {
        let gender = match data.labels.get("gender").map(|g| g.as_str()) {
            Some("male") => VoiceGender::Male,
            Some("female") => VoiceGender::Female,
            _ => VoiceGender::Unknown,
        };
        SynthesisVoice {
            name: data.name,
            languages: LANGUAGES.iter().map(|l| l.to_string()).collect(),
            gender,
            speaker_count: None,
            package: None,
        }
    }
}

#[async_trait]
impl SynthesisEngine for ElevenLabsEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities::default()
    }

    fn check_configuration(&self, options: &SynthesisOptions) -> Result<(), SynthesisError> {
        options
            .engine_options::<ElevenLabsOptions>(ENGINE_NAME)
            .api_key()
            .map(|_| ())
    }

    async fn list_voices(&self, options: &SynthesisOptions) -> Result<Vec<SynthesisVoice>> {
        let config: ElevenLabsOptions = options.engine_options(ENGINE_NAME);
        let api_key = config.api_key()?;
        let voices = self.fetch_voices(api_key).await?;
        Ok(voices.into_iter().map(SynthesisVoice::from).collect())
    }

    async fn synthesize(&self, request: EngineRequest<'_>) -> Result<EngineOutput, SynthesisError> {
        let config: ElevenLabsOptions = request.options.engine_options(ENGINE_NAME);
        let api_key = config.api_key()?;
        let voice_id = self.voice_id(&request.voice.name, api_key).await;

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{voice_id}?output_format=pcm_{OUTPUT_SAMPLE_RATE}"
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&SynthesizeRequest {
                text: request.text,
                model_id: &config.model_id,
            })
            .send()
            .await
            .context("Failed to send request to ElevenLabs")
            .map_err(SynthesisError::Backend)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Backend(anyhow::anyhow!(
                "ElevenLabs API error {status}: {body}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read audio bytes")
            .map_err(SynthesisError::Backend)?;

        // Speed and pitch are not API parameters
        Ok(
            EngineOutput::new(RawAudio::mono(pcm16le_to_f32(&bytes), OUTPUT_SAMPLE_RATE))
                .postprocess_speed_and_pitch(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_api_key() {
        let engine = ElevenLabsEngine::new();
        let mut options = SynthesisOptions::default();
        assert!(matches!(
            engine.check_configuration(&options),
            Err(SynthesisError::Configuration(_))
        ));

        options.engines.insert(
            ENGINE_NAME.to_string(),
            serde_json::json!({ "api_key": "sk-test" }),
        );
        assert!(engine.check_configuration(&options).is_ok());
        assert_eq!(
            options.engine_options::<ElevenLabsOptions>(ENGINE_NAME).model_id,
            "eleven_multilingual_v2"
        );
    }

    #[test]
    fn voice_gender_comes_from_labels() {
        let json = r#"{"voices":[{"voice_id":"abc","name":"Rachel","labels":{"gender":"female"}}]}"#;
        let response: VoicesResponse = serde_json::from_str(json).unwrap();
        let voice = SynthesisVoice::from(response.voices.into_iter().next().unwrap());
        assert_eq!(voice.name, "Rachel");
        assert_eq!(voice.gender, VoiceGender::Female);
        assert!(voice.declares_language("en"));
    }
}
