//! Wire protocol between a client and an out-of-process synthesis worker.
//!
//! Every message is one binary frame holding a JSON map with a
//! `messageType` tag and a `requestId`. Events and the terminal response of
//! a request carry the request's id; a `CancelRequest` names the request it
//! targets.

pub mod client;
pub mod frame;
pub mod messages;

use thiserror::Error;

pub use client::{PendingSynthesis, WorkerClient};
pub use frame::{read_frame, write_frame, Frame, FrameKind, MAX_FRAME_LEN};
pub use messages::{
    decode_message, encode_message, event_from_message, new_request_id, Message, WireAudio,
    WireError, WireSegment, WireSynthesisResult,
};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("Unknown frame kind 0x{0:02x}")]
    UnknownFrameKind(u8),

    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message is not a map")]
    NotAMap,

    #[error("Message has no requestId")]
    MissingRequestId,

    #[error("Invalid audio payload: {0}")]
    InvalidAudio(String),
}

impl DecodeError {
    /// Fatal errors leave the stream out of sync; the connection must close.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::Io(_) | DecodeError::FrameTooLarge(_))
    }
}
