//! Uniform dispatch over interchangeable synthesis backends.

pub mod azure;
pub mod elevenlabs;
pub mod espeak;
pub mod mock;
pub mod package;
pub mod params;
pub mod provider;
pub mod registry;

pub use package::{DirectoryPackageResolver, PackageResolver};
pub use provider::{EngineCapabilities, EngineOutput, EngineRequest, SharedEngine, SynthesisEngine};
pub use registry::EngineRegistry;

use std::path::PathBuf;
use tracing::debug;

use crate::error::SynthesisError;
use crate::settings::SynthesisOptions;
use crate::voice::SynthesisVoice;

/// Checks that must pass before any backend call: SSML support, engine
/// configuration, then speaker id range.
pub fn preflight(
    engine: &dyn SynthesisEngine,
    voice: &SynthesisVoice,
    options: &SynthesisOptions,
    is_ssml: bool,
) -> Result<(), SynthesisError> {
    if is_ssml && !engine.capabilities().supports_ssml {
        return Err(SynthesisError::configuration(format!(
            "Engine '{}' does not support SSML input",
            engine.name()
        )));
    }

    engine.check_configuration(options)?;

    if let Some(speaker) = engine.requested_speaker(options) {
        let count = voice.speaker_count.unwrap_or(1);
        if speaker >= count {
            return Err(SynthesisError::configuration(format!(
                "Speaker id {speaker} is out of range for voice '{}' ({count} speakers)",
                voice.name
            )));
        }
    }

    Ok(())
}

/// Resolves the voice's package when the engine needs one.
pub async fn resolve_model_path(
    engine: &dyn SynthesisEngine,
    voice: &SynthesisVoice,
    options: &SynthesisOptions,
    packages: &dyn PackageResolver,
) -> Result<Option<PathBuf>, SynthesisError> {
    if !engine.capabilities().requires_package {
        return Ok(None);
    }
    let package = voice.package.as_deref().ok_or_else(|| {
        SynthesisError::configuration(format!(
            "Voice '{}' of engine '{}' has no package reference",
            voice.name,
            engine.name()
        ))
    })?;
    packages.resolve(package, options).await.map(Some)
}

/// Synthesizes one sentence: preflight, package resolution, then the backend
/// call.
pub async fn dispatch(
    engine: &dyn SynthesisEngine,
    packages: &dyn PackageResolver,
    text: &str,
    voice: &SynthesisVoice,
    language: &str,
    options: &SynthesisOptions,
    is_ssml: bool,
) -> Result<EngineOutput, SynthesisError> {
    preflight(engine, voice, options, is_ssml)?;
    let model_path = resolve_model_path(engine, voice, options, packages).await?;

    debug!(engine = %engine.name(), voice = %voice.name, chars = text.len(), "Dispatching sentence");
    engine
        .synthesize(EngineRequest {
            text,
            voice,
            language,
            options,
            model_path: model_path.as_deref(),
            is_ssml,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::mock::{MockEngine, MockEngineConfig};
    use super::*;
    use crate::voice::VoiceGender;

    fn voice() -> SynthesisVoice {
        SynthesisVoice::new("mock-voice", &["en-US"], VoiceGender::Female)
    }

    #[tokio::test]
    async fn ssml_to_plain_engine_fails_before_call() {
        let engine = MockEngine::named("mock");
        let result = dispatch(
            &engine,
            &DirectoryPackageResolver,
            "<speak>Hi</speak>",
            &voice(),
            "en",
            &SynthesisOptions::default(),
            true,
        )
        .await;

        assert!(matches!(result, Err(SynthesisError::Configuration(_))));
        assert_eq!(engine.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_required_option_fails_before_call() {
        let engine = MockEngine::new(MockEngineConfig {
            required_option: Some("token".to_string()),
            ..Default::default()
        });
        let options = SynthesisOptions::default();
        let result = dispatch(&engine, &DirectoryPackageResolver, "Hi", &voice(), "en", &options, false).await;
        assert!(matches!(result, Err(SynthesisError::Configuration(_))));
        assert_eq!(engine.call_count(), 0);

        let mut options = SynthesisOptions::default();
        options.engines.insert(
            "mock".to_string(),
            serde_json::json!({ "token": "secret" }),
        );
        let result = dispatch(&engine, &DirectoryPackageResolver, "Hi", &voice(), "en", &options, false).await;
        assert!(result.is_ok());
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn speaker_out_of_range_fails_before_call() {
        let engine = MockEngine::named("mock");
        let mut voice = voice();
        voice.speaker_count = Some(2);

        let mut options = SynthesisOptions::default();
        options
            .engines
            .insert("mock".to_string(), serde_json::json!({ "speaker": 2 }));
        let result = dispatch(&engine, &DirectoryPackageResolver, "Hi", &voice, "en", &options, false).await;
        assert!(matches!(result, Err(SynthesisError::Configuration(_))));

        options
            .engines
            .insert("mock".to_string(), serde_json::json!({ "speaker": 1 }));
        let result = dispatch(&engine, &DirectoryPackageResolver, "Hi", &voice, "en", &options, false).await;
        assert!(result.is_ok());
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn package_is_resolved_to_model_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pkg")).unwrap();
        let options = SynthesisOptions {
            packages_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let engine = MockEngine::new(MockEngineConfig {
            requires_package: true,
            ..Default::default()
        });

        let mut packaged = voice();
        packaged.package = Some("pkg".to_string());
        dispatch(&engine, &DirectoryPackageResolver, "Hi", &packaged, "en", &options, false)
            .await
            .unwrap();
        assert_eq!(engine.calls()[0].model_path, Some(dir.path().join("pkg")));

        let result = dispatch(&engine, &DirectoryPackageResolver, "Hi", &voice(), "en", &options, false).await;
        assert!(matches!(result, Err(SynthesisError::Configuration(_))));
    }
}
