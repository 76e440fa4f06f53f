//! Client against a real chanargs server.

use axum::{Router, routing::post};
use chanargs::Server;
use chanargs::prelude::*;
use chanargs_client::{Channel, Code};
use futures::Stream;

#[derive(Clone, PartialEq, prost::Message)]
struct CountRequest {
    #[prost(uint32, tag = "1")]
    count: u32,
    /// Fail after this many messages, if non-zero.
    #[prost(uint32, tag = "2")]
    fail_after: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
struct CountResponse {
    #[prost(uint32, tag = "1")]
    n: u32,
}

async fn count(
    ConnectRequest(req): ConnectRequest<CountRequest>,
) -> ConnectStreamResponse<impl Stream<Item = Result<CountResponse, ConnectError>>> {
    ConnectStreamResponse::new(async_stream::stream! {
        for n in 0..req.count {
            if req.fail_after != 0 && n == req.fail_after {
                yield Err(ConnectError::new(Code::Aborted, "stopped early"));
                break;
            }
            yield Ok(CountResponse { n });
        }
    })
}

async fn echo_count(
    ConnectRequest(req): ConnectRequest<CountRequest>,
) -> ConnectResponse<CountResponse> {
    ConnectResponse(CountResponse { n: req.count })
}

/// Unary response whose body never ends.
async fn flood() -> axum::response::Response {
    let chunks = futures::stream::repeat_with(|| {
        Ok::<_, std::io::Error>(axum::body::Bytes::from(vec![0u8; 64 * 1024]))
    });
    axum::response::Response::builder()
        .header("content-type", "application/proto")
        .body(axum::body::Body::from_stream(chunks))
        .unwrap()
}

async fn start() -> (String, Server) {
    let mut server = Server::new(()).unwrap();
    server
        .add_router(
            Router::new()
                .route("/test.Counter/Count", post(count))
                .route("/test.Counter/Echo", post(echo_count))
                .route("/test.Counter/Flood", post(flood)),
        )
        .unwrap();
    let port = server.add_insecure_port("127.0.0.1:0").unwrap();
    server.start().await.unwrap();
    (format!("127.0.0.1:{port}"), server)
}

#[tokio::test]
async fn test_stream_runs_to_completion() {
    let (address, mut server) = start().await;
    let channel = Channel::insecure(&address, ()).unwrap();

    let mut call = channel.server_streaming::<_, CountResponse>(
        "/test.Counter/Count",
        &CountRequest {
            count: 3,
            fail_after: 0,
        },
    );
    let mut seen = Vec::new();
    while let Some(msg) = call.read().await.unwrap() {
        seen.push(msg.n);
    }

    assert_eq!(seen, vec![0, 1, 2]);
    assert_eq!(call.code().await, Code::Ok);
    server.stop(None).await;
}

#[tokio::test]
async fn test_stream_error_from_handler() {
    let (address, mut server) = start().await;
    let channel = Channel::insecure(&address, ()).unwrap();

    let mut call = channel.server_streaming::<_, CountResponse>(
        "/test.Counter/Count",
        &CountRequest {
            count: 5,
            fail_after: 2,
        },
    );
    assert_eq!(call.read().await.unwrap().unwrap().n, 0);
    assert_eq!(call.read().await.unwrap().unwrap().n, 1);

    let err = call.read().await.unwrap_err();
    assert_eq!(err.code(), Code::Aborted);
    assert_eq!(err.message().as_deref(), Some("stopped early"));
    assert_eq!(call.status().unwrap().code(), Code::Aborted);
    server.stop(None).await;
}

#[tokio::test]
async fn test_unary_round_trip() {
    let (address, mut server) = start().await;
    let channel = Channel::insecure(&address, ()).unwrap();

    let resp: CountResponse = channel
        .unary(
            "/test.Counter/Echo",
            &CountRequest {
                count: 7,
                fail_after: 0,
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.n, 7);
    server.stop(None).await;
}

#[tokio::test]
async fn test_unknown_method_is_unimplemented() {
    let (address, mut server) = start().await;
    let channel = Channel::insecure(&address, ()).unwrap();

    let err = channel
        .unary::<_, CountResponse>("/test.Counter/Missing", &CountRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);
    server.stop(None).await;
}

#[tokio::test]
async fn test_unary_response_over_receive_limit() {
    let (address, mut server) = start().await;
    let channel = Channel::insecure(&address, [("grpc.max_receive_message_length", 1024)]).unwrap();

    let err = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        channel.unary::<_, CountResponse>("/test.Counter/Flood", &CountRequest::default()),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert_eq!(err.code(), Code::ResourceExhausted);
    assert!(err.message().unwrap().ends_with("vs. 1024)"));
    server.stop(None).await;
}
