//! `grpc.testing.TestService` served by a [`Server`].

use std::time::Duration;

use axum::{Router, routing::post};
use chanargs::prelude::*;
use chanargs::{IntoOptionSet, Server, ServerError};
use futures::Stream;

use crate::messages::{
    Payload, SimpleRequest, SimpleResponse, StreamingOutputCallRequest,
    StreamingOutputCallResponse,
};

pub const UNARY_CALL: &str = "/grpc.testing.TestService/UnaryCall";
pub const STREAMING_OUTPUT_CALL: &str = "/grpc.testing.TestService/StreamingOutputCall";

pub fn router() -> Router {
    Router::new()
        .route(UNARY_CALL, post(unary_call))
        .route(STREAMING_OUTPUT_CALL, post(streaming_output_call))
}

async fn unary_call(
    ConnectRequest(req): ConnectRequest<SimpleRequest>,
) -> Result<ConnectResponse<SimpleResponse>, ConnectError> {
    let size = usize::try_from(req.response_size).map_err(|_| {
        ConnectError::new(Code::InvalidArgument, "response_size must not be negative")
    })?;

    Ok(ConnectResponse(SimpleResponse {
        payload: Some(Payload::zeros(size)),
    }))
}

async fn streaming_output_call(
    ConnectRequest(req): ConnectRequest<StreamingOutputCallRequest>,
) -> ConnectStreamResponse<impl Stream<Item = Result<StreamingOutputCallResponse, ConnectError>>> {
    let stream = async_stream::stream! {
        for params in req.response_parameters {
            if params.interval_us > 0 {
                tokio::time::sleep(Duration::from_micros(params.interval_us as u64)).await;
            }
            match usize::try_from(params.size) {
                Ok(size) => {
                    yield Ok(StreamingOutputCallResponse {
                        payload: Some(Payload::zeros(size)),
                    });
                }
                Err(_) => {
                    yield Err(ConnectError::new(Code::InvalidArgument, "size must not be negative"));
                    break;
                }
            }
        }
    };

    ConnectStreamResponse::new(stream)
}

/// Start a test server with default options on an ephemeral loopback port.
///
/// Returns the `host:port` address and the started server.
pub async fn start_test_server() -> Result<(String, Server), ServerError> {
    start_test_server_with_options(()).await
}

pub async fn start_test_server_with_options(
    options: impl IntoOptionSet,
) -> Result<(String, Server), ServerError> {
    let mut server = Server::new(options)?;
    server.add_router(router())?;
    let port = server.add_insecure_port("127.0.0.1:0")?;
    server.start().await?;

    tracing::debug!(port, "test server started");
    Ok((format!("127.0.0.1:{port}"), server))
}
