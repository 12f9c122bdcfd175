use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DecodeError;
use crate::audio::RawAudio;
use crate::error::SynthesisError;
use crate::pipeline::{SegmentEvent, SegmentOutput, SentenceEvent, SynthesisEvent, SynthesisResult};
use crate::settings::SynthesisOptions;
use crate::timeline::Timeline;
use crate::voice::SynthesisVoice;

/// 16 random bytes as 32 lowercase hex characters.
pub fn new_request_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Audio on the wire: one base64 string of little-endian `f32` per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAudio {
    pub sample_rate: u32,
    pub channels: Vec<String>,
}

impl From<&RawAudio> for WireAudio {
    fn from(audio: &RawAudio) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            channels: audio
                .channels
                .iter()
                .map(|channel| {
                    let bytes: Vec<u8> = channel.iter().flat_map(|s| s.to_le_bytes()).collect();
                    STANDARD.encode(bytes)
                })
                .collect(),
        }
    }
}

impl TryFrom<WireAudio> for RawAudio {
    type Error = DecodeError;

    fn try_from(wire: WireAudio) -> Result<Self, Self::Error> {
        let channels = wire
            .channels
            .iter()
            .map(|encoded| {
                let bytes = STANDARD
                    .decode(encoded)
                    .map_err(|e| DecodeError::InvalidAudio(e.to_string()))?;
                if bytes.len() % 4 != 0 {
                    return Err(DecodeError::InvalidAudio(format!(
                        "{} bytes is not a whole number of f32 samples",
                        bytes.len()
                    )));
                }
                Ok(bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect())
            })
            .collect::<Result<Vec<Vec<f32>>, _>>()?;
        RawAudio::new(channels, wire.sample_rate)
            .map_err(|e| DecodeError::InvalidAudio(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSegment {
    pub text: String,
    pub audio: WireAudio,
    pub timeline: Timeline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSynthesisResult {
    pub audio: WireAudio,
    pub timeline: Timeline,
    pub language: String,
    #[serde(default)]
    pub voice: Option<SynthesisVoice>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub segments: Vec<WireSegment>,
}

/// A failure reported by the worker: the error kind name plus its message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireError {
    pub kind: String,
    pub message: String,
}

impl From<&SynthesisError> for WireError {
    fn from(error: &SynthesisError) -> Self {
        let message = match error {
            SynthesisError::Configuration(m) | SynthesisError::NoMatchingVoice(m) => m.clone(),
            other => format!("{other:#}"),
        };
        Self {
            kind: error.kind().to_string(),
            message,
        }
    }
}

impl From<WireError> for SynthesisError {
    fn from(error: WireError) -> Self {
        match error.kind.as_str() {
            "configuration" => SynthesisError::Configuration(error.message),
            "no_matching_voice" => SynthesisError::NoMatchingVoice(error.message),
            "canceled" => SynthesisError::Canceled,
            "backend" => SynthesisError::Backend(anyhow::anyhow!(error.message)),
            _ => SynthesisError::Internal(anyhow::anyhow!(error.message)),
        }
    }
}

/// Every message kind exchanged between client and worker. The request id
/// travels next to the `messageType` tag in the same map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "messageType")]
pub enum Message {
    #[serde(rename_all = "camelCase")]
    SynthesizeSegmentsRequest {
        segments: Vec<String>,
        #[serde(default)]
        options: SynthesisOptions,
    },
    #[serde(rename_all = "camelCase")]
    SynthesisSegmentEvent {
        index: usize,
        total: usize,
        text: String,
        audio: WireAudio,
        timeline: Timeline,
        language: String,
        /// `None` while only silence has been produced
        peak_decibels_so_far: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    SynthesisSentenceEvent {
        segment_index: usize,
        index: usize,
        total: usize,
        text: String,
        audio: WireAudio,
        timeline: Timeline,
        language: String,
        peak_decibels_so_far: Option<f64>,
    },
    SynthesizeSegmentsResponse {
        result: WireSynthesisResult,
    },
    ErrorResponse {
        error: WireError,
    },
    VoiceListRequest {
        #[serde(default)]
        options: SynthesisOptions,
    },
    VoiceListResponse {
        voices: Vec<SynthesisVoice>,
    },
    #[serde(rename_all = "camelCase")]
    CancelRequest {
        target_request_id: String,
    },
}

impl Message {
    /// Terminal messages end their request; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Message::SynthesizeSegmentsResponse { .. }
                | Message::ErrorResponse { .. }
                | Message::VoiceListResponse { .. }
        )
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            Message::SynthesizeSegmentsRequest { .. } => "SynthesizeSegmentsRequest",
            Message::SynthesisSegmentEvent { .. } => "SynthesisSegmentEvent",
            Message::SynthesisSentenceEvent { .. } => "SynthesisSentenceEvent",
            Message::SynthesizeSegmentsResponse { .. } => "SynthesizeSegmentsResponse",
            Message::ErrorResponse { .. } => "ErrorResponse",
            Message::VoiceListRequest { .. } => "VoiceListRequest",
            Message::VoiceListResponse { .. } => "VoiceListResponse",
            Message::CancelRequest { .. } => "CancelRequest",
        }
    }

    pub fn error(error: &SynthesisError) -> Self {
        Message::ErrorResponse {
            error: WireError::from(error),
        }
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn peak_from_wire(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NEG_INFINITY)
}

impl From<&SynthesisEvent> for Message {
    fn from(event: &SynthesisEvent) -> Self {
        match event {
            SynthesisEvent::Segment(e) => Message::SynthesisSegmentEvent {
                index: e.index,
                total: e.total,
                text: e.text.clone(),
                audio: WireAudio::from(&e.audio),
                timeline: e.timeline.clone(),
                language: e.language.clone(),
                peak_decibels_so_far: finite(e.peak_decibels_so_far),
            },
            SynthesisEvent::Sentence(e) => Message::SynthesisSentenceEvent {
                segment_index: e.segment_index,
                index: e.index,
                total: e.total,
                text: e.text.clone(),
                audio: WireAudio::from(&e.audio),
                timeline: e.timeline.clone(),
                language: e.language.clone(),
                peak_decibels_so_far: finite(e.peak_decibels_so_far),
            },
        }
    }
}

/// Rebuilds a pipeline event from an event message. Returns `Ok(None)` for
/// other message kinds.
pub fn event_from_message(message: Message) -> Result<Option<SynthesisEvent>, DecodeError> {
    let event = match message {
        Message::SynthesisSegmentEvent {
            index,
            total,
            text,
            audio,
            timeline,
            language,
            peak_decibels_so_far,
        } => SynthesisEvent::Segment(SegmentEvent {
            index,
            total,
            text,
            audio: RawAudio::try_from(audio)?,
            timeline,
            language,
            peak_decibels_so_far: peak_from_wire(peak_decibels_so_far),
        }),
        Message::SynthesisSentenceEvent {
            segment_index,
            index,
            total,
            text,
            audio,
            timeline,
            language,
            peak_decibels_so_far,
        } => SynthesisEvent::Sentence(SentenceEvent {
            segment_index,
            index,
            total,
            text,
            audio: RawAudio::try_from(audio)?,
            timeline,
            language,
            peak_decibels_so_far: peak_from_wire(peak_decibels_so_far),
        }),
        _ => return Ok(None),
    };
    Ok(Some(event))
}

impl From<&SynthesisResult> for WireSynthesisResult {
    fn from(result: &SynthesisResult) -> Self {
        Self {
            audio: WireAudio::from(&result.audio),
            timeline: result.timeline.clone(),
            language: result.language.clone(),
            voice: result.voice.clone(),
            engine: result.engine.clone(),
            segments: result
                .segments
                .iter()
                .map(|s| WireSegment {
                    text: s.text.clone(),
                    audio: WireAudio::from(&s.audio),
                    timeline: s.timeline.clone(),
                })
                .collect(),
        }
    }
}

impl TryFrom<WireSynthesisResult> for SynthesisResult {
    type Error = DecodeError;

    fn try_from(wire: WireSynthesisResult) -> Result<Self, Self::Error> {
        Ok(SynthesisResult {
            audio: RawAudio::try_from(wire.audio)?,
            timeline: wire.timeline,
            language: wire.language,
            voice: wire.voice,
            engine: wire.engine,
            segments: wire
                .segments
                .into_iter()
                .map(|s| {
                    Ok(SegmentOutput {
                        text: s.text,
                        audio: RawAudio::try_from(s.audio)?,
                        timeline: s.timeline,
                    })
                })
                .collect::<Result<_, DecodeError>>()?,
        })
    }
}

/// Serializes `message` as a JSON map with `requestId` merged in.
pub fn encode_message(request_id: &str, message: &Message) -> Result<Vec<u8>, serde_json::Error> {
    let mut value = serde_json::to_value(message)?;
    if let Value::Object(map) = &mut value {
        map.insert("requestId".to_string(), Value::String(request_id.to_string()));
    }
    serde_json::to_vec(&value)
}

/// Parses a payload into its request id and message.
pub fn decode_message(payload: &[u8]) -> Result<(String, Message), DecodeError> {
    let mut value: Value = serde_json::from_slice(payload)?;
    let Value::Object(map) = &mut value else {
        return Err(DecodeError::NotAMap);
    };
    let request_id = match map.remove("requestId") {
        Some(Value::String(id)) if !id.is_empty() => id,
        _ => return Err(DecodeError::MissingRequestId),
    };
    let message = serde_json::from_value(value)?;
    Ok((request_id, message))
}
