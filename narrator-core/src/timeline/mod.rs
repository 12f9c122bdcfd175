//! Hierarchical, time-aligned transcript: segment -> sentence -> word.

pub mod assembler;

use serde::{Deserialize, Serialize};

pub use assembler::{SegmentTimelines, TimelineAssembler};

/// Timestamps closer than this are considered equal.
pub const TIME_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntryKind {
    Segment,
    Sentence,
    Word,
    Token,
    Phoneme,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timeline: Vec<TimelineEntry>,
}

pub type Timeline = Vec<TimelineEntry>;

impl TimelineEntry {
    pub fn new(kind: EntryKind, text: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            kind,
            text: text.into(),
            start_time,
            end_time,
            timeline: Vec::new(),
        }
    }

    pub fn word(text: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self::new(EntryKind::Word, text, start_time, end_time)
    }

    pub fn with_children(mut self, children: Timeline) -> Self {
        self.timeline = children;
        self
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Shift every timestamp by `delta` seconds, recursively. Results are clamped
/// at zero.
pub fn offset_timeline(timeline: &[TimelineEntry], delta: f64) -> Timeline {
    timeline
        .iter()
        .map(|entry| TimelineEntry {
            kind: entry.kind,
            text: entry.text.clone(),
            start_time: (entry.start_time + delta).max(0.0),
            end_time: (entry.end_time + delta).max(0.0),
            timeline: offset_timeline(&entry.timeline, delta),
        })
        .collect()
}

/// Multiply every timestamp by `factor`, recursively.
pub fn scale_timeline(timeline: &[TimelineEntry], factor: f64) -> Timeline {
    timeline
        .iter()
        .map(|entry| TimelineEntry {
            kind: entry.kind,
            text: entry.text.clone(),
            start_time: entry.start_time * factor,
            end_time: entry.end_time * factor,
            timeline: scale_timeline(&entry.timeline, factor),
        })
        .collect()
}

/// A word-class token contains at least one letter or digit.
pub fn is_word_text(text: &str) -> bool {
    text.chars().any(|c| c.is_alphanumeric())
}

/// Drop word/token entries whose text is punctuation or whitespace only.
/// Structural entries (segments, sentences) are kept and filtered recursively.
pub fn retain_words(timeline: &[TimelineEntry]) -> Timeline {
    timeline
        .iter()
        .filter(|entry| match entry.kind {
            EntryKind::Word | EntryKind::Token => is_word_text(&entry.text),
            _ => true,
        })
        .map(|entry| TimelineEntry {
            timeline: retain_words(&entry.timeline),
            ..entry.clone()
        })
        .collect()
}

/// True if the tree contains at least one word entry.
pub fn has_words(timeline: &[TimelineEntry]) -> bool {
    timeline
        .iter()
        .any(|e| e.kind == EntryKind::Word || has_words(&e.timeline))
}

pub fn word_count(timeline: &[TimelineEntry]) -> usize {
    timeline
        .iter()
        .map(|e| usize::from(e.kind == EntryKind::Word) + word_count(&e.timeline))
        .sum()
}

/// Checks the structural invariants: `end >= start`, siblings ascending and
/// non-overlapping, children inside their parent.
pub fn is_well_formed(timeline: &[TimelineEntry]) -> bool {
    check_level(timeline, None)
}

fn check_level(entries: &[TimelineEntry], parent: Option<(f64, f64)>) -> bool {
    let mut previous_end = f64::NEG_INFINITY;
    for entry in entries {
        if entry.end_time + TIME_TOLERANCE < entry.start_time {
            return false;
        }
        if entry.start_time + TIME_TOLERANCE < previous_end {
            return false;
        }
        if let Some((start, end)) = parent {
            if entry.start_time + TIME_TOLERANCE < start || entry.end_time > end + TIME_TOLERANCE {
                return false;
            }
        }
        if !check_level(&entry.timeline, Some((entry.start_time, entry.end_time))) {
            return false;
        }
        previous_end = entry.end_time;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Timeline {
        vec![TimelineEntry::new(EntryKind::Sentence, "Hi, there.", 1.0, 3.0).with_children(vec![
            TimelineEntry::word("Hi", 1.0, 1.5),
            TimelineEntry::word(",", 1.5, 1.5),
            TimelineEntry::word("there", 1.6, 2.5),
            TimelineEntry::word(".", 2.5, 2.5),
        ])]
    }

    #[test]
    fn offset_shifts_every_level() {
        let shifted = offset_timeline(&sample(), -0.5);
        assert_eq!(shifted[0].start_time, 0.5);
        assert!((shifted[0].timeline[2].start_time - 1.1).abs() < 1e-9);
        assert_eq!(shifted[0].timeline[2].end_time, 2.0);
    }

    #[test]
    fn scale_then_inverse_restores() {
        let original = sample();
        let restored = scale_timeline(&scale_timeline(&original, 1.0 / 1.7), 1.7);
        for (a, b) in original[0].timeline.iter().zip(&restored[0].timeline) {
            assert!((a.start_time - b.start_time).abs() < 1e-9);
            assert!((a.end_time - b.end_time).abs() < 1e-9);
        }
    }

    #[test]
    fn retain_words_prunes_punctuation() {
        let filtered = retain_words(&sample());
        let words: Vec<&str> = filtered[0].timeline.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(words, vec!["Hi", "there"]);
        assert_eq!(filtered[0].text, "Hi, there.");
    }

    #[test]
    fn well_formed_detects_overlap_and_escape() {
        assert!(is_well_formed(&sample()));

        let mut overlapping = sample();
        overlapping[0].timeline[2].start_time = 1.2;
        assert!(!is_well_formed(&overlapping));

        let mut escaping = sample();
        escaping[0].timeline[3].end_time = 3.5;
        assert!(!is_well_formed(&escaping));
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let json = serde_json::to_value(&sample()).unwrap();
        assert_eq!(json[0]["type"], "sentence");
        assert_eq!(json[0]["startTime"], 1.0);
        assert_eq!(json[0]["timeline"][0]["text"], "Hi");
    }
}
