//! Response wrapper for server-streaming calls.
//!
//! Every message is sent as an envelope frame. The stream is terminated by an
//! EndStream frame: `{}` when the handler stream ran to completion, or the
//! first error it yielded. A message exceeding the server's send limit ends
//! the stream with `RESOURCE_EXHAUSTED`.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chanargs_core::{end_stream_frame, wrap_envelope};
use futures::{Stream, StreamExt};
use prost::Message;

use crate::context::RequestContext;
use crate::error::ConnectError;

/// A response wrapper for server-streaming handlers.
#[derive(Debug)]
pub struct ConnectStreamResponse<S> {
    stream: S,
}

impl<S> ConnectStreamResponse<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S, T> IntoResponse for ConnectStreamResponse<S>
where
    S: Stream<Item = Result<T, ConnectError>> + Send + 'static,
    T: Message + Send + 'static,
{
    fn into_response(self) -> Response {
        // The body is polled after the middleware scope has ended, so the limit
        // is captured here.
        let send_limits = RequestContext::current().limits.send;

        let error_sent = Arc::new(AtomicBool::new(false));
        let error_sent_clone = error_sent.clone();

        let body_stream = self
            .stream
            .map(move |result| {
                let status = match result {
                    Ok(msg) => {
                        let payload = msg.encode_to_vec();
                        match send_limits.check_send(payload.len()) {
                            Ok(()) => return (Bytes::from(wrap_envelope(&payload)), false),
                            Err(status) => {
                                tracing::debug!(
                                    size = payload.len(),
                                    "ending stream on oversized message"
                                );
                                status
                            }
                        }
                    }
                    Err(ConnectError(status)) => status,
                };
                (Bytes::from(end_stream_frame(Some(&status))), true)
            })
            // Stop after the first error frame.
            .scan(false, move |error_seen, (bytes, is_error)| {
                if *error_seen {
                    futures::future::ready(None)
                } else {
                    if is_error {
                        *error_seen = true;
                        error_sent.store(true, Ordering::SeqCst);
                    }
                    futures::future::ready(Some(bytes))
                }
            })
            .chain(
                futures::stream::once(async move {
                    if error_sent_clone.load(Ordering::SeqCst) {
                        None
                    } else {
                        Some(Bytes::from(end_stream_frame(None)))
                    }
                })
                .filter_map(|x| async { x }),
            )
            .map(Ok::<_, Infallible>);

        let mut response = Response::new(Body::from_stream(body_stream));
        *response.status_mut() = StatusCode::OK;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/connect+proto"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RequestProtocol, ServerLimits};
    use chanargs_core::{
        Code, ENVELOPE_HEADER_SIZE, MessageLimits, Status, envelope_flags, parse_envelope_header,
    };
    use http_body_util::BodyExt;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Chunk {
        #[prost(bytes = "vec", tag = "1")]
        body: Vec<u8>,
    }

    fn split_frames(mut body: &[u8]) -> Vec<(u8, Vec<u8>)> {
        let mut frames = Vec::new();
        while !body.is_empty() {
            let (flags, len) = parse_envelope_header(body).unwrap();
            let end = ENVELOPE_HEADER_SIZE + len as usize;
            frames.push((flags, body[ENVELOPE_HEADER_SIZE..end].to_vec()));
            body = &body[end..];
        }
        frames
    }

    async fn collect(response: Response) -> Vec<(u8, Vec<u8>)> {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        split_frames(&body)
    }

    fn streaming_context(send: MessageLimits) -> RequestContext {
        RequestContext {
            protocol: RequestProtocol::StreamProto,
            limits: ServerLimits {
                receive: MessageLimits::receive_default(),
                send,
            },
        }
    }

    #[tokio::test]
    async fn test_messages_then_success_trailer() {
        let items = vec![
            Ok(Chunk { body: vec![1; 3] }),
            Ok(Chunk { body: vec![2; 4] }),
        ];
        let response = ConnectStreamResponse::new(futures::stream::iter(items)).into_response();
        let frames = collect(response).await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].0, envelope_flags::MESSAGE);
        assert_eq!(Chunk::decode(&frames[1].1[..]).unwrap().body, vec![2; 4]);
        assert_eq!(frames[2], (envelope_flags::END_STREAM, b"{}".to_vec()));
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let items = vec![
            Ok(Chunk { body: vec![1] }),
            Err(ConnectError(Status::internal("boom"))),
            Ok(Chunk { body: vec![2] }),
        ];
        let response = ConnectStreamResponse::new(futures::stream::iter(items)).into_response();
        let frames = collect(response).await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].0, envelope_flags::END_STREAM);
        let json: serde_json::Value = serde_json::from_slice(&frames[1].1).unwrap();
        assert_eq!(json["error"]["code"], "internal");
        assert_eq!(json["error"]["message"], "boom");
    }

    #[tokio::test]
    async fn test_send_limit_ends_stream() {
        let items = vec![
            Ok(Chunk { body: vec![1; 4] }),
            Ok(Chunk { body: vec![1; 64] }),
            Ok(Chunk { body: vec![1; 4] }),
        ];
        let response = streaming_context(MessageLimits::new(16))
            .scope(async {
                ConnectStreamResponse::new(futures::stream::iter(items)).into_response()
            })
            .await;
        let frames = collect(response).await;

        assert_eq!(frames.len(), 2);
        let json: serde_json::Value = serde_json::from_slice(&frames[1].1).unwrap();
        assert_eq!(json["error"]["code"], Code::ResourceExhausted.as_str());
        assert_eq!(
            json["error"]["message"],
            "sent message larger than max (66 vs. 16)"
        );
    }
}
