//! Streaming frame decoding.
//!
//! [`FrameDecoder`] parses envelope frames from a byte stream and yields
//! decoded messages. The receive limit is enforced as soon as a frame header
//! announces its length, before the payload is buffered.

use std::fmt::Display;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, BytesMut};
use chanargs_core::{
    Code, ENVELOPE_HEADER_SIZE, FrameKind, MessageLimits, frame_kind, parse_envelope_header,
};
use futures::Stream;
use prost::Message;

use crate::ClientError;
use crate::error_parser::parse_end_stream;

/// Decoded streaming frame result.
enum DecodedFrame<T> {
    Message(T),
    EndStream,
}

/// Stream adapter that decodes envelope frames.
///
/// # Frame Format
///
/// ```text
/// [flags:1][length:4][payload:length]
/// ```
///
/// Flags:
/// - `0x00`: Message
/// - `0x02`: End of stream
pub struct FrameDecoder<S, T> {
    /// The underlying byte stream.
    stream: S,
    /// Buffer for incomplete frames.
    buffer: BytesMut,
    limits: MessageLimits,
    /// Whether the stream has finished (received EndStream or error).
    finished: bool,
    /// Error from the EndStream frame, if any.
    end_stream_error: Option<ClientError>,
    _marker: PhantomData<T>,
}

impl<S, T> FrameDecoder<S, T> {
    pub fn new(stream: S, limits: MessageLimits) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            limits,
            finished: false,
            end_stream_error: None,
            _marker: PhantomData,
        }
    }

    /// Check if the stream has finished.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Try to parse a complete frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was parsed
    /// - `Ok(None)` if more data is needed
    /// - `Err(e)` if there was a parsing error or a limit violation
    fn try_parse_frame(&mut self) -> Result<Option<DecodedFrame<T>>, ClientError>
    where
        T: Message + Default,
    {
        if self.buffer.len() < ENVELOPE_HEADER_SIZE {
            return Ok(None);
        }

        let (flags, length) = parse_envelope_header(&self.buffer)?;
        let kind = frame_kind(flags)?;
        let length = length as usize;

        if kind == FrameKind::Message {
            self.limits.check_receive(length)?;
        }

        let frame_size = ENVELOPE_HEADER_SIZE + length;
        if self.buffer.len() < frame_size {
            return Ok(None);
        }

        self.buffer.advance(ENVELOPE_HEADER_SIZE);
        let payload = self.buffer.split_to(length).freeze();

        match kind {
            FrameKind::EndStream => {
                self.finished = true;
                self.end_stream_error = parse_end_stream(&payload)?;
                Ok(Some(DecodedFrame::EndStream))
            }
            FrameKind::Message => {
                let message = T::decode(payload)
                    .map_err(|e| ClientError::Decode(format!("protobuf decoding failed: {}", e)))?;
                Ok(Some(DecodedFrame::Message(message)))
            }
        }
    }
}

impl<S, T> Unpin for FrameDecoder<S, T> where S: Unpin {}

impl<S, B, E, T> Stream for FrameDecoder<S, T>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: Buf,
    E: Display,
    T: Message + Default,
{
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(err) = this.end_stream_error.take() {
                return Poll::Ready(Some(Err(err)));
            }

            if this.finished {
                return Poll::Ready(None);
            }

            match this.try_parse_frame() {
                Ok(Some(DecodedFrame::Message(msg))) => {
                    return Poll::Ready(Some(Ok(msg)));
                }
                Ok(Some(DecodedFrame::EndStream)) => {
                    if let Some(err) = this.end_stream_error.take() {
                        return Poll::Ready(Some(Err(err)));
                    }
                    return Poll::Ready(None);
                }
                Ok(None) => {}
                Err(e) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }

            match Pin::new(&mut this.stream).poll_next(cx) {
                Poll::Ready(Some(Ok(mut chunk))) => {
                    while chunk.has_remaining() {
                        let part = chunk.chunk();
                        let len = part.len();
                        this.buffer.extend_from_slice(part);
                        chunk.advance(len);
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(ClientError::Transport(format!(
                        "stream error: {}",
                        e
                    )))));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    if !this.buffer.is_empty() {
                        return Poll::Ready(Some(Err(ClientError::new(
                            Code::DataLoss,
                            format!(
                                "stream ended with {} bytes of incomplete data",
                                this.buffer.len()
                            ),
                        ))));
                    }
                    return Poll::Ready(Some(Err(ClientError::Protocol(
                        "stream ended without EndStream frame".into(),
                    ))));
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
    }
}
