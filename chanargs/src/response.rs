//! Response type for unary calls.
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use prost::Message;

use crate::context::RequestContext;
use crate::error::ConnectError;

#[derive(Debug, Clone)]
pub struct ConnectResponse<T>(pub T);

impl<T> ConnectResponse<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> IntoResponse for ConnectResponse<T>
where
    T: Message,
{
    fn into_response(self) -> Response {
        let ctx = RequestContext::current();
        let body = self.0.encode_to_vec();

        if let Err(status) = ctx.limits.send.check_send(body.len()) {
            tracing::debug!(size = body.len(), "refusing to send oversized response");
            return ConnectError::from(status).into_response();
        }

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = StatusCode::OK;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(ctx.protocol.response_content_type()),
        );
        response
    }
}

// So that `Result<ConnectResponse<T>, ConnectError>` can be returned from handlers.
impl<T> From<ConnectResponse<T>> for Result<ConnectResponse<T>, ConnectError> {
    fn from(res: ConnectResponse<T>) -> Self {
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RequestProtocol, ServerLimits};
    use chanargs_core::MessageLimits;
    use http_body_util::BodyExt;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Echo {
        #[prost(string, tag = "1")]
        text: String,
    }

    #[tokio::test]
    async fn test_encodes_proto_body() {
        let msg = Echo {
            text: "hello".into(),
        };
        let response = RequestContext::default()
            .scope(async { ConnectResponse(msg.clone()).into_response() })
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/proto"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(Echo::decode(body).unwrap(), msg);
    }

    #[tokio::test]
    async fn test_send_limit_turns_into_error() {
        let ctx = RequestContext {
            protocol: RequestProtocol::UnaryProto,
            limits: ServerLimits {
                receive: MessageLimits::receive_default(),
                send: MessageLimits::new(4),
            },
        };
        let response = ctx
            .scope(async {
                ConnectResponse(Echo {
                    text: "too long for the limit".into(),
                })
                .into_response()
            })
            .await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "resource_exhausted");
    }
}
