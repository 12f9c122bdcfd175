use tokio::sync::mpsc;

use crate::audio::RawAudio;
use crate::timeline::Timeline;

/// Streamed while a call runs. Timelines are relative to the start of the
/// unit the event describes.
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    Segment(SegmentEvent),
    Sentence(SentenceEvent),
}

#[derive(Debug, Clone)]
pub struct SegmentEvent {
    pub index: usize,
    pub total: usize,
    pub text: String,
    pub audio: RawAudio,
    /// Sentence entries with word children, offset to the segment start
    pub timeline: Timeline,
    pub language: String,
    /// Loudest peak, in dBFS, of all audio produced so far in the call
    pub peak_decibels_so_far: f64,
}

#[derive(Debug, Clone)]
pub struct SentenceEvent {
    pub segment_index: usize,
    /// Index of the sentence within its segment
    pub index: usize,
    /// Number of sentences in the segment
    pub total: usize,
    pub text: String,
    pub audio: RawAudio,
    /// Word entries offset to the sentence start
    pub timeline: Timeline,
    pub language: String,
    pub peak_decibels_so_far: f64,
}

pub type EventSender = mpsc::UnboundedSender<SynthesisEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SynthesisEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
