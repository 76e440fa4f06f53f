//! Client for chanargs servers.
//!
//! A [`Channel`] is configured from the same channel options as the server:
//!
//! - `grpc.max_receive_message_length`: largest response message accepted
//!   (default 4 MiB, `-1` for unlimited)
//! - `grpc.max_send_message_length`: largest request message sent
//! - `grpc.primary_user_agent`: prepended to the `User-Agent` header
//! - `grpc.keepalive_time_ms`: TCP keep-alive on new connections
//!
//! ## Server Streaming Example
//!
//! ```ignore
//! use chanargs_client::Channel;
//!
//! let channel = Channel::insecure("127.0.0.1:50051", [("grpc.max_receive_message_length", 1024)])?;
//!
//! let mut call = channel.server_streaming::<Request, Response>(
//!     "/grpc.testing.TestService/StreamingOutputCall",
//!     &request,
//! );
//! while let Some(message) = call.read().await? {
//!     println!("Got message: {:?}", message);
//! }
//!
//! channel.close().await;
//! ```

mod channel;
mod error;
mod error_parser;
pub mod frame;
pub mod streaming;
pub mod transport;

pub use channel::Channel;
pub use error::ClientError;
pub use frame::FrameDecoder;
pub use streaming::StreamingCall;
pub use transport::{HyperTransport, HyperTransportBuilder};

pub use chanargs_core::{Code, IntoOptionSet, MessageLimits, OptionSet, Status};
