use anyhow::anyhow;
use thiserror::Error;

/// Failure outcome of a synthesis call. There is no partial success: either a
/// complete `SynthesisResult` is returned or one of these surfaces.
#[derive(Error, Debug)]
pub enum SynthesisError {
    /// Missing credentials/region/token, a voice named without an engine,
    /// SSML routed to an engine without SSML support, or a speaker id out of
    /// range. Raised before any backend call and never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No matching voice: {0}")]
    NoMatchingVoice(String),

    /// Propagated verbatim from a backend. Retrying is the backend's business.
    #[error("Backend error: {0}")]
    Backend(anyhow::Error),

    #[error("Canceled")]
    Canceled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

impl SynthesisError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Stable kind name used on the wire and in logs
    pub fn kind(&self) -> &'static str {
        match self {
            SynthesisError::Configuration(_) => "configuration",
            SynthesisError::NoMatchingVoice(_) => "no_matching_voice",
            SynthesisError::Backend(_) => "backend",
            SynthesisError::Canceled => "canceled",
            SynthesisError::Io(_) => "io",
            SynthesisError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for SynthesisError {
    fn from(source: serde_json::Error) -> Self {
        Self::Internal(anyhow!(source))
    }
}
