//! Per-request context.
//!
//! The server wraps every route in [`context_middleware`], which detects the
//! protocol variant from the `Content-Type` header and scopes a task-local
//! [`RequestContext`] around the handler. Extractors and response types read it
//! to enforce the server's message limits.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chanargs_core::MessageLimits;

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// Protocol variant detected from the incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestProtocol {
    /// Unary with protobuf encoding (`application/proto`).
    /// Response: raw protobuf bytes, errors as JSON.
    #[default]
    UnaryProto,

    /// Streaming with protobuf encoding (`application/connect+proto`).
    /// Response: enveloped messages followed by an EndStream frame.
    StreamProto,

    /// Anything else; rejected by the extractors.
    Unsupported,
}

impl RequestProtocol {
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("application/connect+proto") {
            Self::StreamProto
        } else if content_type.starts_with("application/proto") {
            Self::UnaryProto
        } else {
            Self::Unsupported
        }
    }

    /// Response Content-Type for successful responses.
    pub fn response_content_type(&self) -> &'static str {
        match self {
            Self::StreamProto => "application/connect+proto",
            Self::UnaryProto | Self::Unsupported => "application/proto",
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::StreamProto)
    }
}

/// Limits configured on the server, shared by every route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerLimits {
    pub receive: MessageLimits,
    pub send: MessageLimits,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            receive: MessageLimits::receive_default(),
            send: MessageLimits::unlimited(),
        }
    }
}

/// Context of the request currently being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestContext {
    pub protocol: RequestProtocol,
    pub limits: ServerLimits,
}

impl RequestContext {
    /// The context of the current request.
    ///
    /// Outside of a server route (in unit tests, for example) this returns the
    /// default context.
    pub fn current() -> Self {
        REQUEST_CONTEXT.try_with(|ctx| *ctx).unwrap_or_default()
    }

    /// Run `f` with `self` as the current context.
    pub async fn scope<F: Future>(self, f: F) -> F::Output {
        REQUEST_CONTEXT.scope(self, f).await
    }
}

/// Middleware installing the [`RequestContext`] for a request.
pub(crate) async fn context_middleware(
    State(limits): State<ServerLimits>,
    req: Request,
    next: Next,
) -> Response {
    let protocol = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(RequestProtocol::from_content_type)
        .unwrap_or(RequestProtocol::Unsupported);

    RequestContext { protocol, limits }
        .scope(next.run(req))
        .await
}
