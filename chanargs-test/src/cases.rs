//! End-to-end scenarios, shared by the runner binary and the integration tests.

use std::time::Duration;

use anyhow::{Context, bail, ensure};
use chanargs::{Code, Server};
use chanargs_client::Channel;
use chanargs_core::{IntegerLike, OptionSet, OptionValue};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use serde_json::json;

use crate::messages::{
    Payload, ResponseParameters, SimpleRequest, SimpleResponse, StreamingOutputCallRequest,
    StreamingOutputCallResponse,
};
use crate::service::{
    STREAMING_OUTPUT_CALL, UNARY_CALL, start_test_server, start_test_server_with_options,
};
use crate::socket::probe_reuse_port;

pub const RANDOM_SEED: u64 = 42;
pub const NUM_SERVERS_CREATED: usize = 100;
pub const MAX_MESSAGE_LENGTH: usize = 1024;

const REUSE_PORT_ENABLED: &str = "SO_REUSEPORT enabled";
const REUSE_PORT_DISABLED: &str = "SO_REUSEPORT disabled";
const REUSE_PORT_CHOICES: [(&str, i64); 2] = [(REUSE_PORT_ENABLED, 1), (REUSE_PORT_DISABLED, 0)];

/// A native handle that converts to an integer option value.
#[derive(Debug)]
struct PointerWrapper;

impl IntegerLike for PointerWrapper {
    fn to_integer(&self) -> Result<i64, String> {
        Ok(123456)
    }
}

/// Options of every accepted shape: byte, text and integer values, a byte key
/// and an integer-convertible handle.
fn heterogeneous_options() -> OptionSet {
    OptionSet::new()
        .with("arg1", b"bytes_val")
        .with("arg2", "str_val")
        .with("arg3", 1)
        .with(b"arg4", "str_val")
        .with("arg6", OptionValue::integer_like(PointerWrapper))
}

/// Bind a port on a started server and check whether a second
/// `SO_REUSEPORT` socket can share it.
async fn reuse_port_observed(server: &mut Server) -> anyhow::Result<bool> {
    let port = server.add_insecure_port("127.0.0.1:0")?;
    server.start().await?;
    Ok(probe_reuse_port(port)?)
}

/// Servers created with a random reuse-port setting expose exactly that
/// setting on their listening socket.
pub async fn server_reuse_port_is_set_properly() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(RANDOM_SEED);

    for iteration in 0..NUM_SERVERS_CREATED {
        let (fact, value) = *REUSE_PORT_CHOICES
            .choose(&mut rng)
            .context("no reuse-port choices")?;

        let mut server = Server::new([("grpc.so_reuseport", value)])?;
        let observed = reuse_port_observed(&mut server).await;
        server.stop(None).await;

        match (fact, observed?) {
            (REUSE_PORT_ENABLED, false) => bail!(
                "iteration {iteration}: enabled reuse port in options, but not observed in socket"
            ),
            (REUSE_PORT_DISABLED, true) => bail!(
                "iteration {iteration}: disabled reuse port in options, but observed in socket"
            ),
            _ => {}
        }
    }
    Ok(())
}

pub async fn client_accepts_heterogeneous_options() -> anyhow::Result<()> {
    let channel = Channel::insecure("[::]:0", heterogeneous_options())?;
    let forwarded = channel.options().passthrough().len();
    ensure!(forwarded == 5, "expected 5 forwarded options, got {forwarded}");
    channel.close().await;
    Ok(())
}

pub async fn server_accepts_heterogeneous_options() -> anyhow::Result<()> {
    let mut server = Server::new(heterogeneous_options())?;
    ensure!(
        server.options().get("arg6") == Some(&chanargs_core::ResolvedValue::Integer(123456)),
        "integer-convertible value was not forwarded as 123456"
    );
    server.stop(None).await;
    Ok(())
}

/// Malformed option sets are rejected with an argument error.
pub async fn invalid_client_options_rejected() -> anyhow::Result<()> {
    let invalid = [json!({"foo": "bar"}), json!([["key"]]), json!("str")];

    for options in &invalid {
        match Channel::insecure("[::]:0", options) {
            Ok(_) => bail!("channel accepted malformed options {options}"),
            Err(err) => ensure!(
                err.code() == Code::InvalidArgument,
                "options {options}: expected INVALID_ARGUMENT, got {err}"
            ),
        }
    }
    Ok(())
}

/// A client receive limit fails the call on the first oversized message while
/// the earlier message is still delivered.
pub async fn max_message_length_applied() -> anyhow::Result<()> {
    let (address, mut server) = start_test_server().await?;
    let result = async {
        let channel = Channel::insecure(
            &address,
            [("grpc.max_receive_message_length", MAX_MESSAGE_LENGTH as i64)],
        )?;

        let request = StreamingOutputCallRequest {
            response_parameters: vec![
                // First message passes, second exceeds the limit.
                ResponseParameters::size((MAX_MESSAGE_LENGTH / 2) as i32),
                ResponseParameters::size((MAX_MESSAGE_LENGTH * 2) as i32),
            ],
            ..Default::default()
        };
        let mut call = channel
            .server_streaming::<_, StreamingOutputCallResponse>(STREAMING_OUTPUT_CALL, &request);

        let response = call.read().await?.context("stream ended before first message")?;
        ensure!(
            response.body_len() == MAX_MESSAGE_LENGTH / 2,
            "first message has {} bytes",
            response.body_len()
        );

        let err = match call.read().await {
            Ok(message) => bail!("second read succeeded: {message:?}"),
            Err(err) => err,
        };
        ensure!(
            err.code() == Code::ResourceExhausted,
            "expected RESOURCE_EXHAUSTED, got {err}"
        );
        let details = err.message().unwrap_or_default();
        ensure!(
            details.contains(&MAX_MESSAGE_LENGTH.to_string()),
            "details {details:?} do not mention the limit"
        );

        let code = call.code().await;
        ensure!(code == Code::ResourceExhausted, "final code is {code}");

        channel.close().await;
        anyhow::Ok(())
    }
    .await;

    server.stop(None).await;
    result
}

/// A server send limit ends the stream with RESOURCE_EXHAUSTED.
pub async fn server_send_limit_applied() -> anyhow::Result<()> {
    let (address, mut server) =
        start_test_server_with_options([("grpc.max_send_message_length", 256)]).await?;
    let result = async {
        let channel = Channel::insecure(&address, ())?;
        let request = StreamingOutputCallRequest {
            response_parameters: vec![ResponseParameters::size(64), ResponseParameters::size(512)],
            ..Default::default()
        };
        let mut call = channel
            .server_streaming::<_, StreamingOutputCallResponse>(STREAMING_OUTPUT_CALL, &request);

        let first = call.read().await?.context("stream ended before first message")?;
        ensure!(first.body_len() == 64, "first message has {} bytes", first.body_len());

        let code = call.code().await;
        ensure!(code == Code::ResourceExhausted, "final code is {code}");
        let status = call.status().context("call has no final status")?;
        ensure!(
            status.message().is_some_and(|m| m.contains("256")),
            "status {status} does not mention the limit"
        );
        anyhow::Ok(())
    }
    .await;

    server.stop(None).await;
    result
}

/// Unary round trip, plus the server and client receive limits on unary calls.
pub async fn unary_limits_applied() -> anyhow::Result<()> {
    let (address, mut server) =
        start_test_server_with_options([("grpc.max_receive_message_length", 64)]).await?;
    let result = async {
        let channel = Channel::insecure(&address, [("grpc.max_receive_message_length", 512)])?;

        let response: SimpleResponse = channel
            .unary(
                UNARY_CALL,
                &SimpleRequest {
                    response_size: 256,
                    ..Default::default()
                },
            )
            .await?;
        let size = response.payload.map_or(0, |p| p.body.len());
        ensure!(size == 256, "response payload has {size} bytes");

        // Request over the server's receive limit.
        let err = channel
            .unary::<_, SimpleResponse>(
                UNARY_CALL,
                &SimpleRequest {
                    payload: Some(Payload::zeros(128)),
                    ..Default::default()
                },
            )
            .await
            .err()
            .context("oversized request was accepted")?;
        ensure!(
            err.code() == Code::ResourceExhausted,
            "expected RESOURCE_EXHAUSTED from server, got {err}"
        );

        // Response over the client's receive limit.
        let err = channel
            .unary::<_, SimpleResponse>(
                UNARY_CALL,
                &SimpleRequest {
                    response_size: 1024,
                    ..Default::default()
                },
            )
            .await
            .err()
            .context("oversized response was accepted")?;
        ensure!(
            err.code() == Code::ResourceExhausted,
            "expected RESOURCE_EXHAUSTED from client, got {err}"
        );
        anyhow::Ok(())
    }
    .await;

    server.stop(None).await;
    result
}

/// Calls on a closed channel are cancelled.
pub async fn closed_channel_cancels_calls() -> anyhow::Result<()> {
    let (address, mut server) = start_test_server().await?;
    let channel = Channel::insecure(&address, ())?;
    channel.close().await;

    let result = channel
        .unary::<_, SimpleResponse>(UNARY_CALL, &SimpleRequest::default())
        .await;
    server.stop(None).await;

    match result {
        Ok(_) => bail!("call on a closed channel succeeded"),
        Err(err) => ensure!(err.code() == Code::Canceled, "expected CANCELLED, got {err}"),
    }
    Ok(())
}

/// How a server is taken down while a call is still streaming.
#[derive(Clone, Copy, Debug)]
enum Teardown {
    Stop,
    ExpiredGrace,
    Drop,
}

/// Start a slow stream, take the server down after the first message and
/// drain the call. Returns the number of messages read after the teardown and
/// the final code.
async fn in_flight_call_outcome(teardown: Teardown) -> anyhow::Result<(usize, Code)> {
    let (address, mut server) = start_test_server().await?;
    let channel = Channel::insecure(&address, ())?;
    let request = StreamingOutputCallRequest {
        response_parameters: (0..5)
            .map(|_| ResponseParameters {
                size: 8,
                interval_us: 200_000,
            })
            .collect(),
        ..Default::default()
    };
    let mut call = channel
        .server_streaming::<_, StreamingOutputCallResponse>(STREAMING_OUTPUT_CALL, &request);
    call.read().await?.context("stream ended before first message")?;

    match teardown {
        Teardown::Stop => server.stop(None).await,
        Teardown::ExpiredGrace => server.stop(Some(Duration::from_millis(100))).await,
        Teardown::Drop => drop(server),
    }

    let mut after = 0;
    let code = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match call.read().await {
                Ok(Some(_)) => after += 1,
                Ok(None) => return Code::Ok,
                Err(err) => return err.code(),
            }
        }
    })
    .await
    .context("call still running after the server went down")?;
    Ok((after, code))
}

/// Stopping without a grace period, stopping past the grace period and
/// dropping the server all cancel calls in flight.
pub async fn server_stop_cancels_in_flight_calls() -> anyhow::Result<()> {
    for teardown in [Teardown::Stop, Teardown::ExpiredGrace, Teardown::Drop] {
        let (after, code) = in_flight_call_outcome(teardown).await?;
        ensure!(
            code != Code::Ok,
            "{teardown:?}: in-flight call completed OK after {after} more messages"
        );
    }
    Ok(())
}
