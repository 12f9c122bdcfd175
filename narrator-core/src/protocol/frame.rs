//! Frame format: 1-byte kind, 4-byte little-endian payload length, payload.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::DecodeError;

/// Frames larger than this close the connection.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

impl FrameKind {
    pub fn to_byte(self) -> u8 {
        match self {
            FrameKind::Text => 0x01,
            FrameKind::Binary => 0x02,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(FrameKind::Text),
            0x02 => Some(FrameKind::Binary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn binary(payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Binary,
            payload,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Text,
            payload: text.into().into_bytes(),
        }
    }
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> std::io::Result<()> {
    let len = u32::try_from(frame.payload.len())
        .ok()
        .filter(|len| *len as usize <= MAX_FRAME_LEN)
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("frame of {} bytes exceeds the limit", frame.payload.len()),
            )
        })?;
    writer.write_u8(frame.kind.to_byte()).await?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&frame.payload).await?;
    writer.flush().await
}

/// Reads one frame. Returns `Ok(None)` on a clean end of stream before a
/// frame starts. A frame of unknown kind is consumed whole before its error
/// is returned, so the stream stays in sync.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Frame>, DecodeError> {
    let kind = match reader.read_u8().await {
        Ok(kind) => kind,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(DecodeError::Io(e)),
    };

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(DecodeError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    match FrameKind::from_byte(kind) {
        Some(kind) => Ok(Some(Frame { kind, payload })),
        None => Err(DecodeError::UnknownFrameKind(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_round_trip_in_order() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Frame::binary(b"hello".to_vec())).await.unwrap();
        write_frame(&mut buf, &Frame::text("note")).await.unwrap();
        assert_eq!(&buf[..5], &[0x02, 5, 0, 0, 0]);

        let mut reader = &buf[..];
        let first = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(first, Frame::binary(b"hello".to_vec()));
        let second = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(second.kind, FrameKind::Text);
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_kind_is_skipped_whole() {
        let mut buf = vec![0x07, 2, 0, 0, 0, 0xaa, 0xbb];
        write_frame(&mut buf, &Frame::binary(vec![1])).await.unwrap();

        let mut reader = &buf[..];
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(DecodeError::UnknownFrameKind(0x07))
        ));
        assert_eq!(read_frame(&mut reader).await.unwrap().unwrap().payload, vec![1]);
    }

    #[tokio::test]
    async fn oversized_frame_is_fatal() {
        let mut buf = vec![0x02];
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut reader = &buf[..];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn truncated_frame_is_an_io_error() {
        let buf = vec![0x02, 10, 0, 0, 0, 1, 2];
        let mut reader = &buf[..];
        assert!(matches!(read_frame(&mut reader).await, Err(DecodeError::Io(_))));
    }
}
