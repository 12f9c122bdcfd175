use once_cell::sync::Lazy;
use regex::Regex;

/// Sentence-boundary collaborator.
pub trait SentenceSplitter: Send + Sync {
    fn split(&self, text: &str, language: &str) -> Vec<String>;
}

static BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?…。！？]+["'”’»)\]]*"#).unwrap());

const CLOSERS: &[char] = &['"', '\'', '”', '’', '»', ')', ']'];

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "inc", "ltd", "co", "mt",
    "fig", "approx", "dept", "gen", "gov", "sgt", "capt", "lt", "col",
];

/// Splits after runs of terminal punctuation followed by whitespace (or the
/// end of text). Full-width CJK terminators split without whitespace.
/// A single period after a known abbreviation, a lone capital initial other
/// than `I` or a dotted abbreviation such as `e.g.` does not end a sentence.
/// `No.` only counts as an abbreviation before a number.
#[derive(Debug, Default, Clone)]
pub struct PunctuationSentenceSplitter;

fn ends_with_abbreviation(preceding: &str, following: &str) -> bool {
    let token = preceding
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .trim_start_matches(|c: char| !c.is_alphanumeric());
    if token.is_empty() {
        return false;
    }

    let mut chars = token.chars();
    if let (Some(first), None) = (chars.next(), chars.next()) {
        return first.is_uppercase() && first != 'I';
    }

    let lower = token.to_lowercase();
    if lower == "no" {
        return following
            .trim_start()
            .starts_with(|c: char| c.is_ascii_digit());
    }

    token.contains('.') || ABBREVIATIONS.contains(&lower.as_str())
}

impl SentenceSplitter for PunctuationSentenceSplitter {
    fn split(&self, text: &str, _language: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for m in BOUNDARY.find_iter(text) {
            let terminator = m.as_str();
            let full_width = terminator.contains(['。', '！', '？']);
            let at_break = text[m.end()..]
                .chars()
                .next()
                .map_or(true, char::is_whitespace);
            if !(at_break || full_width) {
                continue;
            }

            if terminator.trim_end_matches(CLOSERS) == "."
                && ends_with_abbreviation(&text[start..m.start()], &text[m.end()..])
            {
                continue;
            }

            let sentence = text[start..m.end()].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = m.end();
        }

        let rest = text[start..].trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }
        sentences
    }
}
