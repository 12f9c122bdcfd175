//! Language code normalization, canonical dialects and a script-based
//! language detector.

/// Normalizes `EN_us` style codes to `en-US`.
pub fn normalize_language_code(code: &str) -> String {
    let code = code.trim().replace('_', "-");
    let mut parts = code.splitn(2, '-');
    let language = parts.next().unwrap_or_default().to_lowercase();
    match parts.next() {
        Some(region) if !region.is_empty() => {
            // Script subtags (zh-Hant) keep title case, regions are upper case
            let region = if region.len() == 4 {
                let mut chars = region.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                    }
                    None => String::new(),
                }
            } else {
                region.to_uppercase()
            };
            format!("{language}-{region}")
        }
        _ => language,
    }
}

/// `en-GB` -> `en`
pub fn short_language_code(code: &str) -> String {
    normalize_language_code(code)
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub fn has_region(code: &str) -> bool {
    normalize_language_code(code).contains('-')
}

/// The dialect preferred when only a short code was requested.
pub fn canonical_dialect(short_code: &str) -> Option<&'static str> {
    let dialect = match short_code {
        "en" => "en-US",
        "zh" => "zh-CN",
        "es" => "es-ES",
        "pt" => "pt-BR",
        "fr" => "fr-FR",
        "de" => "de-DE",
        "ar" => "ar-EG",
        "it" => "it-IT",
        "nl" => "nl-NL",
        "ru" => "ru-RU",
        "ja" => "ja-JP",
        "ko" => "ko-KR",
        "hi" => "hi-IN",
        "sv" => "sv-SE",
        "pl" => "pl-PL",
        "tr" => "tr-TR",
        _ => return None,
    };
    Some(dialect)
}

/// Language detection collaborator.
pub trait LanguageDetector: Send + Sync {
    /// Best guess language code for `text`, or `None` when undecidable.
    fn detect(&self, text: &str) -> Option<String>;
}

/// Classifies text by its dominant Unicode script. Latin script maps to the
/// configured default language since it cannot distinguish between the many
/// Latin-script languages.
pub struct ScriptLanguageDetector {
    latin_language: String,
}

impl ScriptLanguageDetector {
    pub fn new(latin_language: impl Into<String>) -> Self {
        Self {
            latin_language: latin_language.into(),
        }
    }
}

impl Default for ScriptLanguageDetector {
    fn default() -> Self {
        Self::new("en")
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Script {
    Latin,
    Cyrillic,
    Greek,
    Arabic,
    Hebrew,
    Devanagari,
    Hangul,
    Kana,
    Han,
    Thai,
}

fn script_of(c: char) -> Option<Script> {
    let script = match c as u32 {
        0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F => Script::Latin,
        0x0370..=0x03FF => Script::Greek,
        0x0400..=0x04FF => Script::Cyrillic,
        0x0590..=0x05FF => Script::Hebrew,
        0x0600..=0x06FF | 0x0750..=0x077F => Script::Arabic,
        0x0900..=0x097F => Script::Devanagari,
        0x0E00..=0x0E7F => Script::Thai,
        0x1100..=0x11FF | 0xAC00..=0xD7AF => Script::Hangul,
        0x3040..=0x30FF => Script::Kana,
        0x4E00..=0x9FFF => Script::Han,
        _ => return None,
    };
    Some(script)
}

impl LanguageDetector for ScriptLanguageDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let mut counts: std::collections::HashMap<Script, usize> = Default::default();
        for script in text.chars().filter_map(script_of) {
            *counts.entry(script).or_default() += 1;
        }

        // Japanese text mixes kana with Han characters
        if counts.get(&Script::Kana).copied().unwrap_or(0) > 0 {
            return Some("ja".to_string());
        }

        let (script, _) = counts.into_iter().max_by_key(|(_, count)| *count)?;
        let code = match script {
            Script::Latin => return Some(self.latin_language.clone()),
            Script::Cyrillic => "ru",
            Script::Greek => "el",
            Script::Arabic => "ar",
            Script::Hebrew => "he",
            Script::Devanagari => "hi",
            Script::Hangul => "ko",
            Script::Kana => "ja",
            Script::Han => "zh",
            Script::Thai => "th",
        };
        Some(code.to_string())
    }
}
