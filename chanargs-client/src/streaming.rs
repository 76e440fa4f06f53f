//! Server-streaming call handle.
//!
//! A [`StreamingCall`] is returned immediately by
//! [`Channel::server_streaming`](crate::Channel::server_streaming); the request
//! is sent on the first [`read`](StreamingCall::read).
//!
//! # Cancellation
//!
//! Dropping a `StreamingCall` cancels the call. The response body is dropped,
//! which closes the underlying HTTP connection.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chanargs_core::{Code, MessageLimits, Status};
use futures::StreamExt;
use http_body_util::BodyDataStream;
use hyper::body::Incoming;
use prost::Message;

use crate::ClientError;
use crate::channel::read_limited;
use crate::frame::FrameDecoder;

pub(crate) type ResponseFuture =
    Pin<Box<dyn Future<Output = Result<http::Response<Incoming>, ClientError>> + Send>>;

enum CallState<T> {
    /// Request not yet answered.
    Pending(ResponseFuture),
    /// Response headers received, reading frames.
    Streaming(FrameDecoder<BodyDataStream<Incoming>, T>),
    /// Call finished; `None` means it succeeded.
    Done(Option<ClientError>),
}

/// Handle to an in-progress server-streaming call.
pub struct StreamingCall<T> {
    state: CallState<T>,
    receive_limits: MessageLimits,
}

impl<T> StreamingCall<T>
where
    T: Message + Default,
{
    pub(crate) fn new(response: ResponseFuture, receive_limits: MessageLimits) -> Self {
        Self {
            state: CallState::Pending(response),
            receive_limits,
        }
    }

    /// A call that already failed before being sent.
    pub(crate) fn failed(error: ClientError, receive_limits: MessageLimits) -> Self {
        Self {
            state: CallState::Done(Some(error)),
            receive_limits,
        }
    }

    /// Read the next response message.
    ///
    /// Returns `Ok(None)` once the server has ended the stream successfully.
    /// After an error every further read returns the same error.
    pub async fn read(&mut self) -> Result<Option<T>, ClientError> {
        let receive_limits = self.receive_limits;
        loop {
            let next = match &mut self.state {
                CallState::Pending(response) => match response.await {
                    Ok(response) => Self::on_headers(response, receive_limits).await,
                    Err(err) => CallState::Done(Some(err)),
                },
                CallState::Streaming(decoder) => match decoder.next().await {
                    Some(Ok(message)) => return Ok(Some(message)),
                    Some(Err(err)) => CallState::Done(Some(err)),
                    None => CallState::Done(None),
                },
                CallState::Done(None) => return Ok(None),
                CallState::Done(Some(err)) => return Err(err.clone()),
            };

            #[cfg(feature = "tracing")]
            if let CallState::Done(Some(err)) = &next {
                tracing::debug!(code = %err.code(), error = %err, "streaming call failed");
            }

            self.state = next;
        }
    }

    /// Wait for the call to finish and return its status code.
    ///
    /// Messages not yet read are discarded.
    pub async fn code(&mut self) -> Code {
        self.finish().await.code()
    }

    /// Wait for the call to finish and return its final status.
    pub async fn finish(&mut self) -> Status {
        loop {
            match self.read().await {
                Ok(Some(_)) => continue,
                Ok(None) => return Status::from_code(Code::Ok),
                Err(err) => return err.to_status(),
            }
        }
    }

    /// The final status, if the call has finished.
    pub fn status(&self) -> Option<Status> {
        match &self.state {
            CallState::Done(None) => Some(Status::from_code(Code::Ok)),
            CallState::Done(Some(err)) => Some(err.to_status()),
            _ => None,
        }
    }

    async fn on_headers(
        response: http::Response<Incoming>,
        receive_limits: MessageLimits,
    ) -> CallState<T> {
        let (parts, body) = response.into_parts();

        if parts.status != http::StatusCode::OK {
            let body = match read_limited(body, MessageLimits::receive_default()).await {
                Ok(body) => body,
                Err(err) => return CallState::Done(Some(err)),
            };
            return CallState::Done(Some(crate::error_parser::parse_error_response(
                parts.status,
                &body,
            )));
        }

        CallState::Streaming(FrameDecoder::new(
            BodyDataStream::new(body),
            receive_limits,
        ))
    }
}

impl<T> fmt::Debug for StreamingCall<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            CallState::Pending(_) => "pending",
            CallState::Streaming(_) => "streaming",
            CallState::Done(_) => "done",
        };
        f.debug_struct("StreamingCall")
            .field("state", &state)
            .field("receive_limits", &self.receive_limits)
            .finish()
    }
}
