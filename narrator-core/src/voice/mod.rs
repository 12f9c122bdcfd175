//! Voice descriptors, language codes, voice selection and the voice list cache.

pub mod cache;
pub mod language;
pub mod selection;

use serde::{Deserialize, Serialize};

pub use cache::VoiceListCache;
pub use language::{LanguageDetector, ScriptLanguageDetector};
pub use selection::{filter_voices, select_best_voice, VoiceQuery};

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VoiceGender {
    Male,
    Female,
    #[default]
    Unknown,
}

/// A voice offered by an engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisVoice {
    pub name: String,
    /// Language codes in preference order, e.g. `["en-US", "en"]`
    pub languages: Vec<String>,
    #[serde(default)]
    pub gender: VoiceGender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_count: Option<u32>,
    /// Model/voice package this voice needs resolved locally before use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

impl SynthesisVoice {
    pub fn new(name: impl Into<String>, languages: &[&str], gender: VoiceGender) -> Self {
        Self {
            name: name.into(),
            languages: languages.iter().map(|l| l.to_string()).collect(),
            gender,
            speaker_count: None,
            package: None,
        }
    }

    pub fn declares_language(&self, code: &str) -> bool {
        self.languages
            .iter()
            .any(|l| language::normalize_language_code(l) == code)
    }

    pub fn primary_language(&self) -> Option<&str> {
        self.languages.first().map(|s| s.as_str())
    }
}
