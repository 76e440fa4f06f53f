//! Extractor for RPC requests.
//!
//! Unary requests carry the raw protobuf message as the body. Streaming
//! requests carry exactly one enveloped message. Either way the message length
//! is checked against the server's receive limit while the body is read, so an
//! oversized request is never buffered in full.
use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Request},
    http::Method,
};
use bytes::BytesMut;
use chanargs_core::{
    Code, ENVELOPE_HEADER_SIZE, FrameKind, MessageLimits, frame_kind, parse_envelope_header,
};
use futures::StreamExt;
use prost::Message;

use crate::context::{RequestContext, RequestProtocol};
use crate::error::ConnectError;

#[derive(Debug, Clone)]
pub struct ConnectRequest<T>(pub T);

impl<T> ConnectRequest<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<S, T> FromRequest<S> for ConnectRequest<T>
where
    S: Send + Sync,
    T: Message + Default,
{
    type Rejection = ConnectError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        if req.method() != Method::POST {
            return Err(ConnectError::new(
                Code::Unimplemented,
                "HTTP method not supported",
            ));
        }

        let ctx = RequestContext::current();
        if ctx.protocol == RequestProtocol::Unsupported {
            return Err(ConnectError::new(
                Code::InvalidArgument,
                "unsupported content-type",
            ));
        }

        let bytes = read_body(req.into_body(), ctx.protocol, ctx.limits.receive).await?;

        let payload = if ctx.protocol.is_streaming() {
            unwrap_single_envelope(bytes)?
        } else {
            bytes
        };
        check_receive(ctx.limits.receive, payload.len())?;

        let message = T::decode(payload)?;
        Ok(ConnectRequest(message))
    }
}

fn check_receive(limits: MessageLimits, size: usize) -> Result<(), ConnectError> {
    limits.check_receive(size).map_err(|status| {
        tracing::debug!(size, "rejecting oversized request");
        ConnectError::from(status)
    })
}

/// Read a request body, enforcing the receive limit as chunks arrive.
///
/// A streaming request is checked against the length declared in its frame
/// header and reading stops once that frame is complete. A unary body is
/// rejected as soon as the bytes read exceed the limit.
async fn read_body(
    body: Body,
    protocol: RequestProtocol,
    limits: MessageLimits,
) -> Result<Bytes, ConnectError> {
    let mut chunks = body.into_data_stream();
    let mut buf = BytesMut::new();
    let mut frame_end = None;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|err| ConnectError::new(Code::Internal, err.to_string()))?;
        buf.extend_from_slice(&chunk);

        if !protocol.is_streaming() {
            check_receive(limits, buf.len())?;
            continue;
        }

        if frame_end.is_none() {
            if let Ok((_, length)) = parse_envelope_header(&buf) {
                check_receive(limits, length as usize)?;
                frame_end = Some(ENVELOPE_HEADER_SIZE + length as usize);
            }
        }
        if frame_end.is_some_and(|end| buf.len() >= end) {
            break;
        }
    }

    Ok(buf.freeze())
}

/// Extract the payload of the single message frame of a streaming request.
///
/// The declared length is checked against the receive limit by the caller, so
/// it is returned as soon as the frame is complete.
fn unwrap_single_envelope(bytes: Bytes) -> Result<Bytes, ConnectError> {
    let (flags, length) = parse_envelope_header(&bytes)
        .map_err(|err| ConnectError::new(Code::InvalidArgument, err.to_string()))?;

    if frame_kind(flags).map_err(|err| ConnectError::new(Code::InvalidArgument, err.to_string()))?
        != FrameKind::Message
    {
        return Err(ConnectError::new(
            Code::InvalidArgument,
            "expected a message frame",
        ));
    }

    let end = ENVELOPE_HEADER_SIZE + length as usize;
    if bytes.len() < end {
        return Err(ConnectError::new(
            Code::InvalidArgument,
            format!("incomplete frame: expected {end} bytes, got {}", bytes.len()),
        ));
    }

    Ok(bytes.slice(ENVELOPE_HEADER_SIZE..end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ServerLimits;
    use chanargs_core::wrap_envelope;
    use futures::stream;
    use std::time::Duration;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Echo {
        #[prost(bytes = "vec", tag = "1")]
        body: Vec<u8>,
    }

    fn post(body: Vec<u8>) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri("/test.Echo/Call")
            .body(Body::from(body))
            .unwrap()
    }

    fn context(protocol: RequestProtocol, receive: MessageLimits) -> RequestContext {
        RequestContext {
            protocol,
            limits: ServerLimits {
                receive,
                send: MessageLimits::unlimited(),
            },
        }
    }

    #[tokio::test]
    async fn test_unary_request_decodes() {
        let msg = Echo {
            body: b"hi".to_vec(),
        };
        let ctx = context(RequestProtocol::UnaryProto, MessageLimits::receive_default());

        let ConnectRequest(decoded) = ctx
            .scope(ConnectRequest::<Echo>::from_request(post(msg.encode_to_vec()), &()))
            .await
            .unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn test_streaming_request_unwraps_envelope() {
        let msg = Echo {
            body: vec![7; 32],
        };
        let ctx = context(RequestProtocol::StreamProto, MessageLimits::receive_default());

        let ConnectRequest(decoded) = ctx
            .scope(ConnectRequest::<Echo>::from_request(
                post(wrap_envelope(&msg.encode_to_vec())),
                &(),
            ))
            .await
            .unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn test_oversized_request_rejected() {
        let msg = Echo {
            body: vec![0; 100],
        };
        let encoded = msg.encode_to_vec();
        let ctx = context(RequestProtocol::StreamProto, MessageLimits::new(10));

        let err = ctx
            .scope(ConnectRequest::<Echo>::from_request(
                post(wrap_envelope(&encoded)),
                &(),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);
        assert_eq!(
            err.status().message().unwrap(),
            format!("received message larger than max ({} vs. 10)", encoded.len())
        );
    }

    /// A body that never ends, in 64 KiB chunks of zeros after `prefix`.
    fn endless_body(prefix: Vec<u8>) -> Request {
        let chunks = stream::once(async move { Ok::<_, std::io::Error>(Bytes::from(prefix)) })
            .chain(stream::repeat_with(|| Ok(Bytes::from(vec![0u8; 64 * 1024]))));
        Request::builder()
            .method(Method::POST)
            .uri("/test.Echo/Call")
            .body(Body::from_stream(chunks))
            .unwrap()
    }

    #[tokio::test]
    async fn test_unbounded_unary_body_rejected_while_reading() {
        let ctx = context(RequestProtocol::UnaryProto, MessageLimits::new(16));

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            ctx.scope(ConnectRequest::<Echo>::from_request(endless_body(Vec::new()), &())),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);
        assert_eq!(
            err.status().message().unwrap(),
            "received message larger than max (65536 vs. 16)"
        );
    }

    #[tokio::test]
    async fn test_unbounded_stream_body_rejected_at_frame_header() {
        let mut header = vec![0u8];
        header.extend_from_slice(&(1u32 << 20).to_be_bytes());
        let ctx = context(RequestProtocol::StreamProto, MessageLimits::new(16));

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            ctx.scope(ConnectRequest::<Echo>::from_request(endless_body(header), &())),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);
        assert_eq!(
            err.status().message().unwrap(),
            "received message larger than max (1048576 vs. 16)"
        );
    }

    #[tokio::test]
    async fn test_streaming_request_split_across_chunks() {
        let msg = Echo {
            body: vec![3; 40],
        };
        let frame = wrap_envelope(&msg.encode_to_vec());
        let chunks: Vec<Result<Bytes, std::io::Error>> = frame
            .chunks(3)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/test.Echo/Call")
            .body(Body::from_stream(stream::iter(chunks)))
            .unwrap();
        let ctx = context(RequestProtocol::StreamProto, MessageLimits::new(64));

        let ConnectRequest(decoded) = ctx
            .scope(ConnectRequest::<Echo>::from_request(req, &()))
            .await
            .unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn test_truncated_frame_rejected() {
        let mut frame = wrap_envelope(b"abcdef");
        frame.truncate(8);
        let ctx = context(RequestProtocol::StreamProto, MessageLimits::receive_default());

        let err = ctx
            .scope(ConnectRequest::<Echo>::from_request(post(frame), &()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_unsupported_content_type_rejected() {
        let ctx = context(RequestProtocol::Unsupported, MessageLimits::receive_default());

        let err = ctx
            .scope(ConnectRequest::<Echo>::from_request(post(Vec::new()), &()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }
}
