//! # chanargs
//!
//! An RPC server whose transport is configured from channel options.
//!
//! Options are validated when the [`Server`] is created, before any socket
//! exists. Recognized options are then applied to the listening sockets
//! (`grpc.so_reuseport`) and to message encoding and decoding
//! (`grpc.max_receive_message_length`, `grpc.max_send_message_length`).
//!
//! ```rust,no_run
//! use axum::{Router, routing::post};
//! use chanargs::Server;
//!
//! # async fn handler() {}
//! # async fn run() -> Result<(), chanargs::ServerError> {
//! let mut server = Server::new([("grpc.so_reuseport", 1)])?;
//! server.add_router(Router::new().route("/pkg.Service/Method", post(handler)))?;
//! let port = server.add_insecure_port("127.0.0.1:0")?;
//! server.start().await?;
//! println!("listening on {port}");
//! server.stop(None).await;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod request;
pub mod response;
pub mod server;
pub mod socket;
pub mod stream_response;

pub use chanargs_core::{
    ChannelOption, Code, IntoOptionSet, MessageLimits, OptionError, OptionSet, Status,
    ValidatedOptions, keys,
};
pub use context::{RequestContext, RequestProtocol};
pub use error::{ConnectError, ServerError};
pub use request::ConnectRequest;
pub use response::ConnectResponse;
pub use server::{Server, ServerState};
pub use stream_response::ConnectStreamResponse;

pub mod prelude {
    //! The types most handlers need.
    pub use crate::error::ConnectError;
    pub use crate::request::ConnectRequest;
    pub use crate::response::ConnectResponse;
    pub use crate::stream_response::ConnectStreamResponse;
    pub use chanargs_core::{Code, Status};
}
