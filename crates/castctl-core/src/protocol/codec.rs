//! Length-prefixed JSON codec for transport frames.
//!
//! Wire format:
//! ```text
//! [payload_len:4][payload:N]
//! ```
//! `payload_len` is big-endian and counts only the JSON body.  Bodies larger
//! than [`MAX_FRAME_LEN`] are rejected on both encode and decode.

use thiserror::Error;
use tracing::trace;

use crate::protocol::frame::Envelope;

/// Size of the length prefix in bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest accepted JSON body (1 MiB).
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Not enough bytes buffered yet for a complete frame.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The declared or encoded body exceeds [`MAX_FRAME_LEN`].
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    TooLarge(usize),

    /// The body is not a valid envelope.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl FrameError {
    /// `true` when the caller should read more bytes and try again.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, FrameError::InsufficientData { .. })
    }
}

/// Encodes an [`Envelope`] into a length-prefixed byte vector.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] if the JSON body exceeds the limit, or
/// [`FrameError::Malformed`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use castctl_core::protocol::{decode_frame, encode_frame, Envelope, Frame};
///
/// let env = Envelope::request(1, Frame::GetStatus);
/// let bytes = encode_frame(&env).unwrap();
/// let (decoded, consumed) = decode_frame(&bytes).unwrap();
/// assert_eq!(decoded, env);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, FrameError> {
    let body = serde_json::to_vec(envelope)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(body.len()));
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Decodes one [`Envelope`] from the beginning of `bytes`.
///
/// Returns the envelope and the number of bytes consumed so the caller can
/// advance its buffer.
///
/// # Errors
///
/// Returns [`FrameError::InsufficientData`] while the frame is incomplete,
/// [`FrameError::TooLarge`] for an oversized declared length, and
/// [`FrameError::Malformed`] for a body that is not a valid envelope.
pub fn decode_frame(bytes: &[u8]) -> Result<(Envelope, usize), FrameError> {
    let body_len = declared_len(bytes)?;
    if body_len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(body_len));
    }

    let total = HEADER_SIZE + body_len;
    if bytes.len() < total {
        return Err(FrameError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let envelope: Envelope = serde_json::from_slice(&bytes[HEADER_SIZE..total])?;
    trace!(kind = envelope.frame.kind(), len = body_len, "decoded frame");
    Ok((envelope, total))
}

/// Reads the body length from the prefix.
///
/// # Errors
///
/// Returns [`FrameError::InsufficientData`] if fewer than [`HEADER_SIZE`]
/// bytes are available.
pub fn declared_len(bytes: &[u8]) -> Result<usize, FrameError> {
    match bytes.get(..HEADER_SIZE) {
        Some(&[a, b, c, d]) => Ok(u32::from_be_bytes([a, b, c, d]) as usize),
        _ => Err(FrameError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::Frame;
    use serde_json::json;

    #[test]
    fn test_encode_prefixes_body_length() {
        // Arrange
        let env = Envelope::notify(Frame::Ack);

        // Act
        let bytes = encode_frame(&env).unwrap();

        // Assert
        let body_len = u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize;
        assert_eq!(body_len, bytes.len() - HEADER_SIZE);
    }

    #[test]
    fn test_decode_reports_incomplete_header() {
        let err = decode_frame(&[0, 0]).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_decode_reports_incomplete_body() {
        // Arrange: a valid frame with its last byte cut off.
        let bytes = encode_frame(&Envelope::notify(Frame::GetStatus)).unwrap();

        // Act
        let err = decode_frame(&bytes[..bytes.len() - 1]).unwrap_err();

        // Assert
        match err {
            FrameError::InsufficientData { needed, available } => {
                assert_eq!(needed, bytes.len());
                assert_eq!(available, bytes.len() - 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_consumes_only_first_of_two_frames() {
        // Arrange
        let first = encode_frame(&Envelope::request(1, Frame::Ack)).unwrap();
        let second = encode_frame(&Envelope::notify(Frame::DeviceMessage {
            payload: json!({"hello": "world"}),
        }))
        .unwrap();
        let mut buf = first.clone();
        buf.extend_from_slice(&second);

        // Act
        let (env, consumed) = decode_frame(&buf).unwrap();
        let (next, rest) = decode_frame(&buf[consumed..]).unwrap();

        // Assert
        assert_eq!(consumed, first.len());
        assert_eq!(env.request_id, Some(1));
        assert_eq!(next.frame.kind(), "device_message");
        assert_eq!(rest, second.len());
    }

    #[test]
    fn test_decode_rejects_oversized_declared_length() {
        let prefix = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        assert!(matches!(
            decode_frame(&prefix),
            Err(FrameError::TooLarge(n)) if n == MAX_FRAME_LEN + 1
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let env = Envelope::notify(Frame::DeviceMessage {
            payload: json!("x".repeat(MAX_FRAME_LEN)),
        });
        assert!(matches!(encode_frame(&env), Err(FrameError::TooLarge(_))));
    }

    #[test]
    fn test_decode_rejects_non_envelope_body() {
        // Arrange
        let body = br#"{"nope":true}"#;
        let mut bytes = (body.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(body);

        // Act / Assert
        assert!(matches!(decode_frame(&bytes), Err(FrameError::Malformed(_))));
    }
}
