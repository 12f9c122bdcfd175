//! Turning caller input into synthesis units.

pub mod sentences;
pub mod ssml;

pub use sentences::{PunctuationSentenceSplitter, SentenceSplitter};
pub use ssml::{escape_xml, ssml_to_plain_text};

/// Splits a segment into the sentences sent to the engine one at a time.
///
/// SSML input and calls with splitting disabled keep the whole trimmed
/// segment as one unit. The result is never empty: a segment with nothing to
/// say becomes a single empty sentence.
pub fn decompose_segment(
    segment: &str,
    ssml: bool,
    split: bool,
    splitter: &dyn SentenceSplitter,
    language: &str,
) -> Vec<String> {
    let trimmed = segment.trim();

    let sentences: Vec<String> = if ssml || !split {
        vec![trimmed.to_string()]
    } else {
        splitter
            .split(trimmed, language)
            .into_iter()
            .map(|s| s.trim().to_string())
            .collect()
    };

    let sentences: Vec<String> = sentences.into_iter().filter(|s| !s.is_empty()).collect();
    if sentences.is_empty() {
        vec![String::new()]
    } else {
        sentences
    }
}

/// Blank-line separated paragraphs, used as segments for plain text input.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}
