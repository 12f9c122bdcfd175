use super::{offset_timeline, EntryKind, Timeline, TimelineEntry};

/// A finished segment in both time bases.
#[derive(Debug, Clone)]
pub struct SegmentTimelines {
    /// Absolute offsets; feeds the top-level timeline
    pub absolute: TimelineEntry,
    /// Offsets relative to the segment's own start; used in segment events
    pub relative: TimelineEntry,
}

struct OpenSegment {
    text: String,
    start_time: f64,
    sentences: Timeline,
}

/// Builds the nested timeline incrementally while sentences are synthesized
/// one after another.
///
/// A running cursor holds the absolute end time of everything added so far.
/// Each sentence's word timeline arrives relative to the sentence start and is
/// shifted by the cursor before being attached.
pub struct TimelineAssembler {
    cursor: f64,
    segments: Timeline,
    open: Option<OpenSegment>,
}

impl Default for TimelineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineAssembler {
    pub fn new() -> Self {
        Self {
            cursor: 0.0,
            segments: Vec::new(),
            open: None,
        }
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Opens a new segment at the current cursor. An already open segment is
    /// finished first.
    pub fn begin_segment(&mut self, text: impl Into<String>) {
        if self.open.is_some() {
            self.finish_segment();
        }
        self.open = Some(OpenSegment {
            text: text.into(),
            start_time: self.cursor,
            sentences: Vec::new(),
        });
    }

    /// Appends a sentence of `duration` seconds whose `words` are relative to
    /// the sentence start, then advances the cursor past it. Returns the
    /// absolute sentence entry.
    pub fn add_sentence(
        &mut self,
        text: impl Into<String>,
        duration: f64,
        words: &[TimelineEntry],
    ) -> TimelineEntry {
        let start = self.cursor;
        let end = start + duration.max(0.0);
        let entry = TimelineEntry::new(EntryKind::Sentence, text, start, end)
            .with_children(offset_timeline(words, start));

        if self.open.is_none() {
            self.begin_segment(String::new());
        }
        if let Some(segment) = self.open.as_mut() {
            segment.sentences.push(entry.clone());
        }
        self.cursor = end;
        entry
    }

    /// Closes the open segment. Returns `None` when no segment is open.
    pub fn finish_segment(&mut self) -> Option<SegmentTimelines> {
        let segment = self.open.take()?;
        let absolute = TimelineEntry::new(
            EntryKind::Segment,
            segment.text,
            segment.start_time,
            self.cursor,
        )
        .with_children(segment.sentences);

        let relative = TimelineEntry {
            start_time: 0.0,
            end_time: absolute.end_time - absolute.start_time,
            timeline: offset_timeline(&absolute.timeline, -absolute.start_time),
            ..absolute.clone()
        };

        self.segments.push(absolute.clone());
        Some(SegmentTimelines { absolute, relative })
    }

    pub fn into_timeline(mut self) -> Timeline {
        self.finish_segment();
        self.segments
    }
}
