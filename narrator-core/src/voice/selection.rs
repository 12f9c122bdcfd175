use super::language::{canonical_dialect, has_region, normalize_language_code, short_language_code};
use super::{SynthesisVoice, VoiceGender};
use crate::error::SynthesisError;

/// What the caller asked for. Every criterion is optional.
#[derive(Debug, Clone, Default)]
pub struct VoiceQuery {
    pub language: Option<String>,
    pub gender: Option<VoiceGender>,
    pub name: Option<String>,
}

impl VoiceQuery {
    pub fn language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Default::default()
        }
    }
}

fn filter_by_language(voices: Vec<SynthesisVoice>, language: &str) -> Vec<SynthesisVoice> {
    let code = normalize_language_code(language);
    let exact: Vec<_> = voices
        .iter()
        .filter(|v| v.declares_language(&code))
        .cloned()
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let short = short_language_code(&code);
    if has_region(&code) {
        return voices
            .into_iter()
            .filter(|v| v.declares_language(&short))
            .collect();
    }

    // A bare short code also accepts any regional dialect of the language
    voices
        .into_iter()
        .filter(|v| v.languages.iter().any(|l| short_language_code(l) == short))
        .collect()
}

fn name_matches(voice_name: &str, pattern: &str) -> bool {
    let name = voice_name.to_lowercase();
    let pattern = pattern.trim().to_lowercase();
    if pattern.chars().any(|c| !c.is_alphanumeric()) {
        return name.contains(&pattern);
    }
    name.split(|c: char| !c.is_alphanumeric())
        .any(|word| word.starts_with(&pattern))
}

/// Apply language, gender and name filters, in that order.
pub fn filter_voices(voices: &[SynthesisVoice], query: &VoiceQuery) -> Vec<SynthesisVoice> {
    let mut filtered = voices.to_vec();

    if let Some(language) = &query.language {
        filtered = filter_by_language(filtered, language);
    }

    if let Some(gender) = query.gender.filter(|g| *g != VoiceGender::Unknown) {
        filtered.retain(|v| v.gender == gender || v.gender == VoiceGender::Unknown);
    }

    if let Some(pattern) = query.name.as_deref().filter(|p| !p.trim().is_empty()) {
        filtered.retain(|v| name_matches(&v.name, pattern));
    }

    filtered
}

/// Filter, then break ties: the first voice wins, unless a bare short
/// language code was requested and some candidate declares its canonical
/// dialect, in which case the first such candidate wins.
pub fn select_best_voice(
    voices: &[SynthesisVoice],
    query: &VoiceQuery,
) -> Result<SynthesisVoice, SynthesisError> {
    let candidates = filter_voices(voices, query);

    if candidates.len() > 1 {
        if let Some(language) = query.language.as_deref().filter(|l| !has_region(l)) {
            let short = short_language_code(language);
            if let Some(dialect) = canonical_dialect(&short) {
                if let Some(voice) = candidates.iter().find(|v| v.declares_language(dialect)) {
                    return Ok(voice.clone());
                }
            }
        }
    }

    candidates.into_iter().next().ok_or_else(|| {
        SynthesisError::NoMatchingVoice(format!(
            "no voice matches language={:?}, gender={:?}, name={:?}",
            query.language, query.gender, query.name
        ))
    })
}
