pub mod alignment;
pub mod audio;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod settings;
pub mod text;
pub mod timeline;
pub mod voice;

// Public library API. These are the types most callers need; everything else
// stays public for embedders that want to swap collaborators.
pub use audio::{RawAudio, DEFAULT_SAMPLE_RATE};
pub use engine::{EngineRegistry, SynthesisEngine};
pub use error::SynthesisError;
pub use pipeline::{
    CancellationToken, SegmentOutput, SynthesisEvent, SynthesisResult, Synthesizer,
    SynthesizerBuilder,
};
pub use settings::{SettingsManager, SynthesisOptions};
pub use timeline::{Timeline, TimelineEntry};
pub use voice::{SynthesisVoice, VoiceGender};
