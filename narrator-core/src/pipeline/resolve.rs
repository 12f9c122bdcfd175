use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::{EngineRegistry, SharedEngine};
use crate::error::SynthesisError;
use crate::settings::SynthesisOptions;
use crate::text::ssml_to_plain_text;
use crate::voice::language::normalize_language_code;
use crate::voice::{
    filter_voices, select_best_voice, LanguageDetector, SynthesisVoice, VoiceListCache, VoiceQuery,
};

/// Offline engines probed, in order, when no engine was requested.
pub const OFFLINE_ENGINE_PRIORITY: [&str; 3] = ["kokoro", "vits", "piper"];

/// Rule-based engine used when no offline engine has a voice for the language.
pub const FALLBACK_ENGINE: &str = "espeak";

/// Immutable outcome of option resolution, shared by every sentence of a call.
#[derive(Clone)]
pub struct ResolvedSynthesis {
    pub options: Arc<SynthesisOptions>,
    pub engine: SharedEngine,
    pub voice: SynthesisVoice,
    pub language: String,
}

impl std::fmt::Debug for ResolvedSynthesis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSynthesis")
            .field("engine", &self.engine.name())
            .field("voice", &self.voice.name)
            .field("language", &self.language)
            .finish()
    }
}

pub struct OptionsResolver<'a> {
    pub registry: &'a EngineRegistry,
    pub voice_cache: Option<&'a VoiceListCache>,
    pub detector: &'a dyn LanguageDetector,
}

impl<'a> OptionsResolver<'a> {
    fn cache_for(&self, options: &SynthesisOptions) -> VoiceListCache {
        match self.voice_cache {
            Some(cache) => cache.clone(),
            None => VoiceListCache::new(
                options.cache_dir(),
                Duration::from_secs(options.voice_list_cache_ttl_secs),
            ),
        }
    }

    /// Voice list of `engine`, served from the per-engine cache file when fresh.
    pub async fn voices_for(
        &self,
        engine: &SharedEngine,
        options: &SynthesisOptions,
    ) -> anyhow::Result<Vec<SynthesisVoice>> {
        self.cache_for(options)
            .get_or_fetch(engine.name(), || engine.list_voices(options))
            .await
    }

    /// Requested language, or the detected one when neither language nor
    /// voice was given.
    pub fn resolve_language(&self, text: &str, options: &SynthesisOptions) -> Option<String> {
        if let Some(language) = &options.language {
            return Some(normalize_language_code(language));
        }
        if options.voice.is_some() {
            return None;
        }

        let plain = if options.ssml {
            ssml_to_plain_text(text)
        } else {
            text.to_string()
        };
        let detected = self
            .detector
            .detect(&plain)
            .unwrap_or_else(|| options.default_language.clone());
        debug!(language = %detected, "Detected language");
        Some(normalize_language_code(&detected))
    }

    /// The requested engine, or the first offline engine with a voice for
    /// `language`, or the rule-based fallback.
    pub async fn resolve_engine(
        &self,
        language: Option<&str>,
        options: &SynthesisOptions,
    ) -> Result<SharedEngine, SynthesisError> {
        if let Some(name) = &options.engine {
            return self.registry.get(name).ok_or_else(|| {
                SynthesisError::configuration(format!(
                    "Unknown engine '{name}'. Available engines: {}",
                    self.registry.names().join(", ")
                ))
            });
        }

        if options.voice.is_some() {
            return Err(SynthesisError::configuration(
                "A voice was named without an engine; the engine cannot be inferred from the voice",
            ));
        }

        let language = language
            .map(str::to_string)
            .unwrap_or_else(|| normalize_language_code(&options.default_language));
        let query = VoiceQuery::language(language.clone());

        for name in OFFLINE_ENGINE_PRIORITY {
            let Some(engine) = self.registry.get(name) else {
                continue;
            };
            match self.voices_for(&engine, options).await {
                Ok(voices) if !filter_voices(&voices, &query).is_empty() => {
                    info!(engine = %name, %language, "Selected offline engine");
                    return Ok(engine);
                }
                Ok(_) => debug!(engine = %name, %language, "No voice for language"),
                Err(e) => warn!(engine = %name, "Failed to list voices while probing: {e:?}"),
            }
        }

        self.registry.get(FALLBACK_ENGINE).ok_or_else(|| {
            SynthesisError::configuration(format!(
                "No engine has a voice for '{language}' and the '{FALLBACK_ENGINE}' fallback is not registered"
            ))
        })
    }

    /// Resolves language, engine and voice for a call over `segments`.
    pub async fn resolve(
        &self,
        segments: &[String],
        options: SynthesisOptions,
    ) -> Result<ResolvedSynthesis, SynthesisError> {
        let language = self.resolve_language(&segments.join("\n\n"), &options);
        let engine = self.resolve_engine(language.as_deref(), &options).await?;

        let voices = self
            .voices_for(&engine, &options)
            .await
            .map_err(SynthesisError::Backend)?;
        let voice = select_best_voice(
            &voices,
            &VoiceQuery {
                language: language.clone(),
                gender: options.voice_gender,
                name: options.voice.clone(),
            },
        )?;

        let language = language
            .or_else(|| voice.primary_language().map(normalize_language_code))
            .unwrap_or_else(|| normalize_language_code(&options.default_language));

        info!(engine = %engine.name(), voice = %voice.name, %language, "Resolved synthesis options");
        Ok(ResolvedSynthesis {
            options: Arc::new(options),
            engine,
            voice,
            language,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockEngine, MockEngineConfig};
    use crate::voice::{ScriptLanguageDetector, VoiceGender};

    fn engine(name: &str, voices: Vec<SynthesisVoice>) -> SharedEngine {
        Arc::new(MockEngine::new(MockEngineConfig {
            name: name.to_string(),
            voices,
            ..Default::default()
        }))
    }

    fn options(dir: &std::path::Path) -> SynthesisOptions {
        SynthesisOptions {
            cache_dir: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn voice_without_engine_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EngineRegistry::new(vec![engine("espeak", vec![])]);
        let detector = ScriptLanguageDetector::default();
        let resolver = OptionsResolver {
            registry: &registry,
            voice_cache: None,
            detector: &detector,
        };

        let mut options = options(dir.path());
        options.voice = Some("amy".to_string());
        let result = resolver.resolve(&["Hello".to_string()], options).await;
        assert!(matches!(result, Err(SynthesisError::Configuration(_))));
    }

    #[tokio::test]
    async fn probes_offline_engines_in_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EngineRegistry::new(vec![
            engine("piper", vec![SynthesisVoice::new("p-de", &["de-DE"], VoiceGender::Male)]),
            engine("vits", vec![SynthesisVoice::new("v-en", &["en-US"], VoiceGender::Female)]),
            engine("espeak", vec![SynthesisVoice::new("en", &["en"], VoiceGender::Unknown)]),
        ]);
        let detector = ScriptLanguageDetector::default();
        let resolver = OptionsResolver {
            registry: &registry,
            voice_cache: None,
            detector: &detector,
        };

        let resolved = resolver
            .resolve(&["Good morning".to_string()], options(dir.path()))
            .await
            .unwrap();
        assert_eq!(resolved.engine.name(), "vits");
        assert_eq!(resolved.voice.name, "v-en");
        assert_eq!(resolved.language, "en");

        let mut german = options(dir.path());
        german.language = Some("de".to_string());
        let resolved = resolver.resolve(&["Guten Morgen".to_string()], german).await.unwrap();
        assert_eq!(resolved.engine.name(), "piper");

        let mut finnish = options(dir.path());
        finnish.language = Some("fi".to_string());
        let result = resolver.resolve(&["Hyvää huomenta".to_string()], finnish).await;
        // espeak is the fallback, but it has no Finnish voice either
        assert!(matches!(result, Err(SynthesisError::NoMatchingVoice(_))));
    }

    #[tokio::test]
    async fn detects_language_from_text() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EngineRegistry::new(vec![engine(
            "espeak",
            vec![
                SynthesisVoice::new("en", &["en"], VoiceGender::Unknown),
                SynthesisVoice::new("ru", &["ru"], VoiceGender::Unknown),
            ],
        )]);
        let detector = ScriptLanguageDetector::default();
        let resolver = OptionsResolver {
            registry: &registry,
            voice_cache: None,
            detector: &detector,
        };

        let resolved = resolver
            .resolve(&["Привет, как дела?".to_string()], options(dir.path()))
            .await
            .unwrap();
        assert_eq!(resolved.language, "ru");
        assert_eq!(resolved.voice.name, "ru");
    }

    #[tokio::test]
    async fn unknown_engine_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EngineRegistry::default();
        let detector = ScriptLanguageDetector::default();
        let resolver = OptionsResolver {
            registry: &registry,
            voice_cache: None,
            detector: &detector,
        };

        let mut options = options(dir.path());
        options.engine = Some("nope".to_string());
        let result = resolver.resolve(&["Hi".to_string()], options).await;
        assert!(matches!(result, Err(SynthesisError::Configuration(_))));
    }
}
