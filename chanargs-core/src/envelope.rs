//! Streaming envelope framing.
//!
//! Streaming calls use envelope framing:
//!
//! ```text
//! [flags:1][length:4][payload:length]
//! ```
//!
//! The last frame of a response stream is an EndStream frame whose payload is
//! JSON: `{}` on success, `{"error": {...}}` on failure.

use crate::error::{EnvelopeError, Status};

/// Envelope flags.
pub mod envelope_flags {
    /// Regular message (uncompressed).
    pub const MESSAGE: u8 = 0x00;
    /// Compressed message.
    pub const COMPRESSED: u8 = 0x01;
    /// End of stream.
    pub const END_STREAM: u8 = 0x02;
}

/// Envelope header size (flags + length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// Kind of frame announced by an envelope header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Message,
    EndStream,
}

/// Wrap payload in a message envelope.
pub fn wrap_envelope(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.push(envelope_flags::MESSAGE);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Build the EndStream frame terminating a response stream.
///
/// `None` produces a successful `{}` trailer.
pub fn end_stream_frame(error: Option<&Status>) -> Vec<u8> {
    let body = match error {
        Some(status) => serde_json::json!({ "error": status }),
        None => serde_json::json!({}),
    };
    let payload = body.to_string().into_bytes();

    let mut frame = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.push(envelope_flags::END_STREAM);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame
}

/// Parse envelope header from bytes.
///
/// Returns `(flags, length)` if successful.
pub fn parse_envelope_header(data: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::IncompleteHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}

/// Classify an envelope by its flags byte.
pub fn frame_kind(flags: u8) -> Result<FrameKind, EnvelopeError> {
    match flags {
        envelope_flags::MESSAGE => Ok(FrameKind::Message),
        envelope_flags::END_STREAM => Ok(FrameKind::EndStream),
        envelope_flags::COMPRESSED => Err(EnvelopeError::UnexpectedCompression),
        other => Err(EnvelopeError::InvalidFlags(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_envelope() {
        let frame = wrap_envelope(b"hello");

        assert_eq!(frame[0], envelope_flags::MESSAGE);
        assert_eq!(
            u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]),
            5
        );
        assert_eq!(&frame[5..], b"hello");
    }

    #[test]
    fn test_end_stream_frame_success() {
        let frame = end_stream_frame(None);
        assert_eq!(frame[0], envelope_flags::END_STREAM);
        assert_eq!(&frame[5..], b"{}");
    }

    #[test]
    fn test_end_stream_frame_error() {
        let status = Status::resource_exhausted("too large");
        let frame = end_stream_frame(Some(&status));

        let json: serde_json::Value = serde_json::from_slice(&frame[5..]).unwrap();
        assert_eq!(json["error"]["code"], "resource_exhausted");
        assert_eq!(json["error"]["message"], "too large");
    }

    #[test]
    fn test_parse_envelope_header() {
        let data = [0x00, 0x00, 0x00, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o'];
        let (flags, length) = parse_envelope_header(&data).unwrap();

        assert_eq!(flags, envelope_flags::MESSAGE);
        assert_eq!(length, 5);
    }

    #[test]
    fn test_parse_envelope_header_incomplete() {
        let result = parse_envelope_header(&[0x00, 0x00, 0x00]);
        assert_eq!(
            result,
            Err(EnvelopeError::IncompleteHeader {
                expected: 5,
                actual: 3
            })
        );
    }

    #[test]
    fn test_frame_kind() {
        assert_eq!(frame_kind(0x00), Ok(FrameKind::Message));
        assert_eq!(frame_kind(0x02), Ok(FrameKind::EndStream));
        assert_eq!(frame_kind(0x01), Err(EnvelopeError::UnexpectedCompression));
        assert_eq!(frame_kind(0xFF), Err(EnvelopeError::InvalidFlags(0xFF)));
    }
}
