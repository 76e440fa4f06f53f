//! Server-side error types.
//!
//! - [`ConnectError`]: error returned by RPC handlers, rendered as a protocol error response
//! - [`ServerError`]: error returned by the [`Server`](crate::Server) lifecycle methods

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chanargs_core::{Code, OptionError, Status, end_stream_frame};

use crate::context::RequestContext;
use crate::server::ServerState;

/// Error returned by handlers.
///
/// Unary calls render it as a JSON body with an HTTP status derived from the
/// code. Streaming calls always answer HTTP 200 and carry the error in the
/// EndStream frame.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ConnectError(pub Status);

impl ConnectError {
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self(Status::new(code, message))
    }

    pub fn code(&self) -> Code {
        self.0.code()
    }

    pub fn status(&self) -> &Status {
        &self.0
    }

    /// HTTP status for unary error responses.
    fn http_status_code(&self) -> StatusCode {
        match self.0.code() {
            Code::Ok => StatusCode::OK,
            Code::Canceled => StatusCode::REQUEST_TIMEOUT,
            Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists => StatusCode::CONFLICT,
            Code::PermissionDenied => StatusCode::FORBIDDEN,
            Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Code::FailedPrecondition => StatusCode::BAD_REQUEST,
            Code::Aborted => StatusCode::CONFLICT,
            Code::OutOfRange => StatusCode::BAD_REQUEST,
            Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
            Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }

    /// Streaming error response: HTTP 200 with a lone EndStream frame.
    pub fn into_streaming_response(self) -> Response {
        let frame = end_stream_frame(Some(&self.0));
        let mut response = Response::new(Body::from(frame));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/connect+proto"),
        );
        response
    }

    /// Unary error response: JSON body, HTTP status mapped from the code.
    pub fn into_unary_response(self) -> Response {
        let status = self.http_status_code();
        let body = serde_json::to_vec(&self.0).unwrap_or_else(|_| b"{\"code\":\"internal\"}".to_vec());
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

impl IntoResponse for ConnectError {
    fn into_response(self) -> Response {
        if RequestContext::current().protocol.is_streaming() {
            self.into_streaming_response()
        } else {
            self.into_unary_response()
        }
    }
}

impl From<Status> for ConnectError {
    fn from(status: Status) -> Self {
        Self(status)
    }
}

impl From<prost::DecodeError> for ConnectError {
    fn from(err: prost::DecodeError) -> Self {
        Self::new(Code::InvalidArgument, format!("protobuf decoding failed: {err}"))
    }
}

/// Errors from the [`Server`](crate::Server) lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The option set given to [`Server::new`](crate::Server::new) was rejected.
    #[error("invalid server options: {0}")]
    Options(#[from] OptionError),

    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Operation not allowed in the current lifecycle state.
    #[error("cannot {operation} a server in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ServerState,
    },

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn code(&self) -> Code {
        match self {
            ServerError::Options(_) | ServerError::InvalidAddress { .. } => Code::InvalidArgument,
            ServerError::InvalidState { .. } => Code::FailedPrecondition,
            ServerError::Io(_) => Code::Unavailable,
        }
    }
}
