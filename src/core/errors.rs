// src/core/errors.rs

//! Defines the primary error type for the multiplexer.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Every way a submitted command can fail.
///
/// A busy backend is deliberately absent: busy is a successful `Reply::Busy`,
/// never an error.
#[derive(Error, Debug)]
pub enum MuxError {
    /// Malformed caller input, rejected before the command is queued.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The backend sent a line the response state machine cannot interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The backend answered with an `ERROR...` header. Carries the full line.
    #[error("Server error: {0}")]
    Backend(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("No response from backend after {0:?}")]
    Timeout(Duration),

    #[error("Command was cancelled before it was sent")]
    Cancelled,

    #[error("Multiplexer is shut down")]
    Closed,
}

impl MuxError {
    /// True for failures caused by the transport rather than by the request.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            MuxError::Connection(_) | MuxError::Io(_) | MuxError::Timeout(_)
        )
    }

    /// A short, stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MuxError::Validation(_) => "validation",
            MuxError::Protocol(_) => "protocol",
            MuxError::Backend(_) => "backend",
            MuxError::Connection(_) | MuxError::Io(_) => "connection",
            MuxError::Timeout(_) => "timeout",
            MuxError::Cancelled => "cancelled",
            MuxError::Closed => "closed",
        }
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for MuxError {
    fn clone(&self) -> Self {
        match self {
            MuxError::Validation(s) => MuxError::Validation(s.clone()),
            MuxError::Protocol(s) => MuxError::Protocol(s.clone()),
            MuxError::Backend(s) => MuxError::Backend(s.clone()),
            MuxError::Connection(s) => MuxError::Connection(s.clone()),
            MuxError::Io(e) => MuxError::Io(Arc::clone(e)),
            MuxError::Timeout(d) => MuxError::Timeout(*d),
            MuxError::Cancelled => MuxError::Cancelled,
            MuxError::Closed => MuxError::Closed,
        }
    }
}

impl PartialEq for MuxError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MuxError::Validation(s1), MuxError::Validation(s2)) => s1 == s2,
            (MuxError::Protocol(s1), MuxError::Protocol(s2)) => s1 == s2,
            (MuxError::Backend(s1), MuxError::Backend(s2)) => s1 == s2,
            (MuxError::Connection(s1), MuxError::Connection(s2)) => s1 == s2,
            (MuxError::Io(e1), MuxError::Io(e2)) => e1.to_string() == e2.to_string(),
            (MuxError::Timeout(d1), MuxError::Timeout(d2)) => d1 == d2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for MuxError {
    fn from(e: std::io::Error) -> Self {
        MuxError::Io(Arc::new(e))
    }
}
