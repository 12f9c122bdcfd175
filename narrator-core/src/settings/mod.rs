pub mod config;
pub mod manager;


pub use config::{AlignmentOptions, PostProcessingOptions, SynthesisOptions, TimePitchMethod};
pub use manager::SettingsManager;
