//! Core types for chanargs.
//!
//! This crate provides the pieces shared by the server (`chanargs`) and the
//! client (`chanargs-client`) crates.
//!
//! ## Modules
//!
//! - `error`: Protocol status codes and the [`Status`] type
//! - `envelope`: Streaming envelope framing functions
//! - `limits`: Message size limits
//! - `options`: Channel options, shape validation and the recognized-key registry

mod envelope;
mod error;
mod limits;
mod options;

pub use envelope::*;
pub use error::*;
pub use limits::*;
pub use options::*;
