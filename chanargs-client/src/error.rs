//! Client-side error types.
//!
//! This module provides [`ClientError`], the error type for channel creation
//! and RPC calls.

use chanargs_core::{Code, EnvelopeError, OptionError, Status};

/// Client-side error variants.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// A status from the server, or produced locally (limits, cancellation).
    #[error("{code}: {}", message.as_deref().unwrap_or(""))]
    Status { code: Code, message: Option<String> },

    /// The option set given to the channel was rejected.
    #[error("invalid channel options: {0}")]
    Options(#[from] OptionError),

    /// Transport-level error (connection failed, reset, etc.).
    #[error("transport error: {0}")]
    Transport(String),

    /// Message decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Protocol error (malformed frames, unexpected data, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Create a new status error with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        ClientError::Status {
            code,
            message: Some(message.into()),
        }
    }

    /// Create a new status error with just a code.
    pub fn from_code(code: Code) -> Self {
        ClientError::Status {
            code,
            message: None,
        }
    }

    /// Get the error code.
    ///
    /// For non-Status variants, returns an appropriate code:
    /// - Options: `InvalidArgument`
    /// - Transport: `Unavailable`
    /// - Decode: `Internal`
    /// - Protocol: `InvalidArgument`
    pub fn code(&self) -> Code {
        match self {
            ClientError::Status { code, .. } => *code,
            ClientError::Options(err) => err.code(),
            ClientError::Transport(_) => Code::Unavailable,
            ClientError::Decode(_) => Code::Internal,
            ClientError::Protocol(_) => Code::InvalidArgument,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> Option<String> {
        match self {
            ClientError::Status { message, .. } => message.clone(),
            ClientError::Options(err) => Some(err.to_string()),
            ClientError::Transport(msg) | ClientError::Decode(msg) | ClientError::Protocol(msg) => {
                Some(msg.clone())
            }
        }
    }

    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Canceled, message)
    }

    /// The error as a [`Status`].
    pub fn to_status(&self) -> Status {
        match self.message() {
            Some(message) => Status::new(self.code(), message),
            None => Status::from_code(self.code()),
        }
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Status {
            code: status.code(),
            message: status.message().map(str::to_owned),
        }
    }
}

impl From<EnvelopeError> for ClientError {
    fn from(err: EnvelopeError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}
