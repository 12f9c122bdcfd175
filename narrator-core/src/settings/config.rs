use crate::voice::VoiceGender;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimePitchMethod {
    /// WSOLA stretch with linear-interpolation pitch resampling
    #[default]
    OverlapAdd,
    /// WSOLA stretch with FFT resampling through rubato
    Rubato,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostProcessingOptions {
    #[serde(default = "default_true")]
    pub normalize_audio: bool,

    /// Peak level, in dBFS, that normalization scales towards
    #[serde(default = "default_target_peak")]
    pub target_peak: f64,

    /// Normalization never amplifies by more than this many dB
    #[serde(default = "default_max_gain_increase")]
    pub max_gain_increase: f64,

    /// Samples quieter than this (dBFS) count as silence when trimming
    #[serde(default = "default_silence_threshold")]
    pub trim_silence_threshold: f64,

    /// Explicit time-stretch factor applied after synthesis
    #[serde(default)]
    pub speed: Option<f64>,

    /// Explicit pitch-shift factor applied after synthesis
    #[serde(default)]
    pub pitch: Option<f64>,

    #[serde(default)]
    pub time_pitch_method: TimePitchMethod,
}

impl Default for PostProcessingOptions {
    fn default() -> Self {
        Self {
            normalize_audio: true,
            target_peak: default_target_peak(),
            max_gain_increase: default_max_gain_increase(),
            trim_silence_threshold: default_silence_threshold(),
            speed: None,
            pitch: None,
            time_pitch_method: TimePitchMethod::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignmentOptions {
    /// Voiced-span detection threshold in dBFS
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f64,

    /// Relative weight of punctuation tokens when distributing time
    #[serde(default = "default_punctuation_weight")]
    pub punctuation_weight: f64,
}

impl Default for AlignmentOptions {
    fn default() -> Self {
        Self {
            silence_threshold: default_silence_threshold(),
            punctuation_weight: default_punctuation_weight(),
        }
    }
}

/// Options for one synthesis call.
///
/// Every field has a serde default, so a partial TOML/JSON document
/// deserializes into a fully resolved record in one step. Engine-specific
/// knobs live in `engines`, keyed by engine name, and are deserialized by the
/// engine itself through [`SynthesisOptions::engine_options`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisOptions {
    /// Engine name; inferred from the language when absent
    #[serde(default)]
    pub engine: Option<String>,

    /// Language code such as `en` or `en-GB`; detected when absent
    #[serde(default)]
    pub language: Option<String>,

    /// Voice name pattern
    #[serde(default)]
    pub voice: Option<String>,

    #[serde(default)]
    pub voice_gender: Option<VoiceGender>,

    #[serde(default = "default_scale")]
    pub speed: f64,

    #[serde(default = "default_scale")]
    pub pitch: f64,

    /// Treat segment text as SSML markup
    #[serde(default)]
    pub ssml: bool,

    #[serde(default = "default_true")]
    pub split_to_sentences: bool,

    /// Silence, in seconds, kept after each interior sentence
    #[serde(default = "default_sentence_end_pause")]
    pub sentence_end_pause: f64,

    /// Silence, in seconds, kept after the last sentence of a segment
    #[serde(default = "default_segment_end_pause")]
    pub segment_end_pause: f64,

    /// Used when language detection has no answer
    #[serde(default = "default_language")]
    pub default_language: String,

    #[serde(default = "default_voice_list_ttl")]
    pub voice_list_cache_ttl_secs: u64,

    /// Voice list cache directory (defaults to ~/.narrator/cache)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Model/voice package directory (defaults to ~/.narrator/packages)
    #[serde(default)]
    pub packages_dir: Option<PathBuf>,

    #[serde(default)]
    pub alignment: AlignmentOptions,

    #[serde(default)]
    pub post_processing: PostProcessingOptions,

    /// Per-engine configuration records, keyed by engine name
    #[serde(default)]
    pub engines: HashMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

fn default_scale() -> f64 {
    1.0
}

fn default_target_peak() -> f64 {
    -3.0
}

fn default_max_gain_increase() -> f64 {
    30.0
}

fn default_silence_threshold() -> f64 {
    -40.0
}

fn default_punctuation_weight() -> f64 {
    0.1
}

fn default_sentence_end_pause() -> f64 {
    0.75
}

fn default_segment_end_pause() -> f64 {
    1.0
}

fn default_language() -> String {
    "en".to_string()
}

fn default_voice_list_ttl() -> u64 {
    60
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            engine: None,
            language: None,
            voice: None,
            voice_gender: None,
            speed: default_scale(),
            pitch: default_scale(),
            ssml: false,
            split_to_sentences: true,
            sentence_end_pause: default_sentence_end_pause(),
            segment_end_pause: default_segment_end_pause(),
            default_language: default_language(),
            voice_list_cache_ttl_secs: default_voice_list_ttl(),
            cache_dir: None,
            packages_dir: None,
            alignment: AlignmentOptions::default(),
            post_processing: PostProcessingOptions::default(),
            engines: HashMap::new(),
        }
    }
}

impl SynthesisOptions {
    /// Get engine-specific configuration, deserializing from the engines map.
    /// Missing or unparseable records fall back to the engine's defaults.
    pub fn engine_options<T: Default + DeserializeOwned>(&self, engine: &str) -> T {
        self.engines
            .get(engine)
            .and_then(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| tracing::warn!("Failed to parse engine options '{engine}': {e}"))
                    .ok()
            })
            .unwrap_or_default()
    }

    /// Set engine-specific configuration, serializing to the engines map.
    /// Unset fields are dropped; TOML has no null.
    pub fn set_engine_options<T: Serialize>(&mut self, engine: &str, config: T) {
        if let Ok(mut value) = serde_json::to_value(&config) {
            strip_nulls(&mut value);
            self.engines.insert(engine.to_string(), value);
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| narrator_home().join("cache"))
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.packages_dir
            .clone()
            .unwrap_or_else(|| narrator_home().join("packages"))
    }
}

fn strip_nulls(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// `~/.narrator`, or a relative `.narrator` when no home directory is known.
pub fn narrator_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".narrator"))
        .unwrap_or_else(|| PathBuf::from(".narrator"))
}
