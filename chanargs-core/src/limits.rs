//! Message size limits.
//!
//! The default receive limit of 4 MB matches gRPC's default; the default send
//! limit is unbounded, also as in gRPC.

use crate::error::Status;

/// Default maximum receive message size (4 MB).
pub const DEFAULT_MAX_RECEIVE_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Direction a limit applies to, used in violation messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Receive,
    Send,
}

/// Configuration for a message size limit.
///
/// # Example
///
/// ```rust
/// use chanargs_core::MessageLimits;
///
/// let limits = MessageLimits::new(1024);
/// assert!(limits.check_receive(512).is_ok());
///
/// let err = limits.check_receive(2048).unwrap_err();
/// assert!(err.message().unwrap().contains("1024"));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageLimits {
    /// `None` means unlimited.
    max_message_size: Option<usize>,
}

impl MessageLimits {
    /// Create new limits with the specified maximum message size in bytes.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size: Some(max_message_size),
        }
    }

    /// Create limits with no maximum.
    pub fn unlimited() -> Self {
        Self {
            max_message_size: None,
        }
    }

    /// Default limits for inbound messages.
    pub fn receive_default() -> Self {
        Self::new(DEFAULT_MAX_RECEIVE_MESSAGE_SIZE)
    }

    /// Returns the maximum message size, or `None` if unlimited.
    pub fn max_message_size(&self) -> Option<usize> {
        self.max_message_size
    }

    /// Check an inbound message length.
    pub fn check_receive(&self, size: usize) -> Result<(), Status> {
        self.check(size, Direction::Receive)
    }

    /// Check an outbound message length.
    pub fn check_send(&self, size: usize) -> Result<(), Status> {
        self.check(size, Direction::Send)
    }

    /// Check a message length, producing `RESOURCE_EXHAUSTED` on violation.
    ///
    /// The status message always names both the offending size and the limit.
    pub fn check(&self, size: usize, direction: Direction) -> Result<(), Status> {
        match self.max_message_size {
            Some(max) if size > max => {
                let verb = match direction {
                    Direction::Receive => "received",
                    Direction::Send => "sent",
                };
                Err(Status::resource_exhausted(format!(
                    "{verb} message larger than max ({size} vs. {max})"
                )))
            }
            _ => Ok(()),
        }
    }
}
