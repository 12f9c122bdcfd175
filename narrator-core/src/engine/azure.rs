//! Azure Cognitive Services text-to-speech over its REST API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::params::{ssml_pitch, ssml_rate};
use super::provider::{EngineCapabilities, EngineOutput, EngineRequest, SynthesisEngine};
use crate::audio::{pcm16le_to_f32, RawAudio};
use crate::error::SynthesisError;
use crate::settings::SynthesisOptions;
use crate::text::escape_xml;
use crate::voice::{SynthesisVoice, VoiceGender};

pub const ENGINE_NAME: &str = "azure";

const OUTPUT_FORMAT: &str = "raw-24khz-16bit-mono-pcm";
const OUTPUT_SAMPLE_RATE: u32 = 24000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_region: Option<String>,
}

impl AzureOptions {
    fn credentials(&self) -> Result<(&str, &str), SynthesisError> {
        let key = self
            .subscription_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SynthesisError::configuration("Azure requires a subscription_key"))?;
        let region = self
            .service_region
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| SynthesisError::configuration("Azure requires a service_region"))?;
        Ok((key, region))
    }
}

pub struct AzureEngine {
    client: Client,
}

impl Default for AzureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureEngine {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

/// Wraps plain text in an SSML document carrying the voice and prosody.
pub fn build_ssml(text: &str, voice: &SynthesisVoice, language: &str, speed: f64, pitch: f64) -> String {
    format!(
        r#"<speak version="1.0" xmlns="http://www.w3.org/2001/10/synthesis" xml:lang="{lang}"><voice name="{name}"><prosody rate="{rate}" pitch="{pitch}">{text}</prosody></voice></speak>"#,
        lang = escape_xml(language),
        name = escape_xml(&voice.name),
        rate = ssml_rate(speed),
        pitch = ssml_pitch(pitch, voice.gender),
        text = escape_xml(text),
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VoiceData {
    short_name: String,
    locale: String,
    #[serde(default)]
    gender: String,
    #[serde(default)]
    secondary_locale_list: Vec<String>,
}

impl From<VoiceData> for SynthesisVoice {
    fn from(data: VoiceData) -> Self {
        let gender = match data.gender.as_str() {
            "Male" => VoiceGender::Male,
            "Female" => VoiceGender::Female,
            _ => VoiceGender::Unknown,
        };
        let mut languages = vec![data.locale.clone()];
        languages.extend(data.secondary_locale_list);
        if let Some(short) = data.locale.split('-').next() {
            languages.push(short.to_string());
        }
        SynthesisVoice {
            name: data.short_name,
            languages,
            gender,
            speaker_count: None,
            package: None,
        }
    }
}

#[async_trait]
impl SynthesisEngine for AzureEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_ssml: true,
            ..Default::default()
        }
    }

    fn check_configuration(&self, options: &SynthesisOptions) -> Result<(), SynthesisError> {
        options
            .engine_options::<AzureOptions>(ENGINE_NAME)
            .credentials()
            .map(|_| ())
    }

    async fn list_voices(&self, options: &SynthesisOptions) -> Result<Vec<SynthesisVoice>> {
        let config: AzureOptions = options.engine_options(ENGINE_NAME);
        let (key, region) = config.credentials()?;

        let response = self
            .client
            .get(format!(
                "https://{region}.tts.speech.microsoft.com/cognitiveservices/voices/list"
            ))
            .header("Ocp-Apim-Subscription-Key", key)
            .send()
            .await
            .context("Failed to list voices from Azure")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Azure API error {status}: {body}");
        }

        let voices: Vec<VoiceData> = response
            .json()
            .await
            .context("Failed to parse voices response")?;
        Ok(voices.into_iter().map(SynthesisVoice::from).collect())
    }

    async fn synthesize(&self, request: EngineRequest<'_>) -> Result<EngineOutput, SynthesisError> {
        let config: AzureOptions = request.options.engine_options(ENGINE_NAME);
        let (key, region) = config.credentials()?;

        let body = if request.is_ssml {
            request.text.to_string()
        } else {
            build_ssml(
                request.text,
                request.voice,
                request.language,
                request.options.speed,
                request.options.pitch,
            )
        };

        let response = self
            .client
            .post(format!(
                "https://{region}.tts.speech.microsoft.com/cognitiveservices/v1"
            ))
            .header("Ocp-Apim-Subscription-Key", key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .header("User-Agent", "narrator")
            .body(body)
            .send()
            .await
            .context("Failed to send request to Azure")
            .map_err(SynthesisError::Backend)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Backend(anyhow::anyhow!(
                "Azure API error {status}: {body}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read audio bytes")
            .map_err(SynthesisError::Backend)?;

        Ok(EngineOutput::new(RawAudio::mono(
            pcm16le_to_f32(&bytes),
            OUTPUT_SAMPLE_RATE,
        )))
    }
}
