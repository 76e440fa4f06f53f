//! Client channel.
//!
//! A [`Channel`] is created from a target address and a channel option set.
//! The options are validated up front; the recognized ones configure the
//! transport (keep-alive), the `User-Agent` header and the message limits
//! enforced on every call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use chanargs_core::{IntoOptionSet, MessageLimits, ValidatedOptions, wrap_envelope};
use http::{HeaderValue, Method, Request, Uri, header};
use hyper::body::Incoming;
use http_body_util::{BodyExt, Full};
use prost::Message;

use crate::ClientError;
use crate::error_parser::parse_error_response;
use crate::streaming::StreamingCall;
use crate::transport::{HyperTransport, HyperTransportBuilder};

const APPLICATION_PROTO: &str = "application/proto";
const APPLICATION_CONNECT_PROTO: &str = "application/connect+proto";
const CONNECT_PROTOCOL_VERSION: &str = "connect-protocol-version";
const DEFAULT_USER_AGENT: &str = concat!("chanargs-client/", env!("CARGO_PKG_VERSION"));

/// A plaintext channel to one server.
///
/// Cloning is cheap; clones share the connection pool and the closed flag.
#[derive(Clone, Debug)]
pub struct Channel {
    transport: HyperTransport,
    base_uri: Uri,
    options: Arc<ValidatedOptions>,
    user_agent: HeaderValue,
    closed: Arc<AtomicBool>,
}

impl Channel {
    /// Create a channel to `target` (`host:port`, `[v6]:port`, optionally with
    /// an `http://` prefix) without TLS.
    ///
    /// Fails with [`ClientError::Options`] when the option set is malformed.
    /// No connection is made until the first call.
    pub fn insecure(target: &str, options: impl IntoOptionSet) -> Result<Self, ClientError> {
        let options = options.into_option_set()?.validate()?;

        let base_uri = if target.starts_with("http://") {
            target.parse::<Uri>()
        } else {
            format!("http://{target}").parse::<Uri>()
        };
        let base_uri = base_uri.map_err(|e| ClientError::invalid_target(target, e))?;
        if base_uri.authority().is_none() || base_uri.path() != "/" {
            return Err(ClientError::invalid_target(target, "expected host:port"));
        }

        let user_agent = match options.primary_user_agent() {
            Some(primary) => format!("{primary} {DEFAULT_USER_AGENT}"),
            None => DEFAULT_USER_AGENT.to_owned(),
        };
        let user_agent = HeaderValue::try_from(user_agent).map_err(|e| {
            ClientError::Options(chanargs_core::OptionError::InvalidValue {
                key: chanargs_core::keys::PRIMARY_USER_AGENT.to_owned(),
                reason: e.to_string(),
            })
        })?;

        let transport = HyperTransportBuilder::from_options(&options).build();

        Ok(Self {
            transport,
            base_uri,
            options: Arc::new(options),
            user_agent,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn options(&self) -> &ValidatedOptions {
        &self.options
    }

    pub fn receive_limits(&self) -> MessageLimits {
        self.options.receive_limits()
    }

    pub fn send_limits(&self) -> MessageLimits {
        self.options.send_limits()
    }

    /// Close the channel. Calls started afterwards fail with `CANCELLED`.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make a unary call to `path` (`/package.Service/Method`).
    pub async fn unary<Req, Res>(&self, path: &str, request: &Req) -> Result<Res, ClientError>
    where
        Req: Message,
        Res: Message + Default,
    {
        let payload = self.encode_checked(request)?;
        let http_request = self.build_request(path, APPLICATION_PROTO, Bytes::from(payload))?;

        let response = self.transport.request(http_request).await?;
        let (parts, body) = response.into_parts();

        if parts.status != http::StatusCode::OK {
            let body = read_limited(body, MessageLimits::receive_default()).await?;
            return Err(parse_error_response(parts.status, &body));
        }

        let body = read_limited(body, self.receive_limits()).await?;
        Res::decode(body).map_err(|e| ClientError::Decode(format!("protobuf decoding failed: {}", e)))
    }

    /// Start a server-streaming call to `path`.
    ///
    /// The call is returned immediately. Local failures (closed channel, send
    /// limit) surface on the first [`read`](StreamingCall::read).
    pub fn server_streaming<Req, Res>(&self, path: &str, request: &Req) -> StreamingCall<Res>
    where
        Req: Message,
        Res: Message + Default,
    {
        let receive_limits = self.receive_limits();
        let http_request = self.encode_checked(request).and_then(|payload| {
            self.build_request(
                path,
                APPLICATION_CONNECT_PROTO,
                Bytes::from(wrap_envelope(&payload)),
            )
        });

        match http_request {
            Ok(http_request) => {
                let transport = self.transport.clone();
                StreamingCall::new(
                    Box::pin(async move { transport.request(http_request).await }),
                    receive_limits,
                )
            }
            Err(err) => StreamingCall::failed(err, receive_limits),
        }
    }

    /// Encode a request, enforcing the send limit before anything is sent.
    fn encode_checked<Req: Message>(&self, request: &Req) -> Result<Vec<u8>, ClientError> {
        if self.is_closed() {
            return Err(ClientError::cancelled("channel closed"));
        }
        let payload = request.encode_to_vec();
        self.send_limits().check_send(payload.len())?;
        Ok(payload)
    }

    fn build_request(
        &self,
        path: &str,
        content_type: &'static str,
        body: Bytes,
    ) -> Result<Request<Full<Bytes>>, ClientError> {
        let uri = format!("{}{}", self.base_uri.to_string().trim_end_matches('/'), path);

        #[cfg(feature = "tracing")]
        tracing::debug!(%uri, size = body.len(), "sending request");

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::USER_AGENT, self.user_agent.clone())
            .header(CONNECT_PROTOCOL_VERSION, "1")
            .body(Full::new(body))
            .map_err(|e| ClientError::Protocol(format!("failed to build request: {}", e)))
    }
}

impl ClientError {
    fn invalid_target(target: &str, reason: impl std::fmt::Display) -> Self {
        ClientError::Transport(format!("invalid target {target:?}: {reason}"))
    }
}

/// Collect a response body, failing with `RESOURCE_EXHAUSTED` as soon as the
/// bytes read exceed `limits`.
pub(crate) async fn read_limited(
    mut body: Incoming,
    limits: MessageLimits,
) -> Result<Bytes, ClientError> {
    let mut buf = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = frame
            .map_err(|e| ClientError::Transport(format!("failed to read response body: {}", e)))?;
        if let Ok(data) = frame.into_data() {
            buf.extend_from_slice(&data);
            limits.check_receive(buf.len())?;
        }
    }
    Ok(buf.freeze())
}
