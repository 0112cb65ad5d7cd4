// src/core/connection/state.rs

use serde::Serialize;
use std::fmt;

/// Connectivity of the single backend connection.
///
/// Written only by the connection lifecycle; the dispatcher reads it to decide
/// whether it may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    /// Connected, greeting line not seen yet.
    HandshakePending,
    /// Greeted, commands may be sent.
    Ready,
    /// The backend greeted with `SERVER_BUSY`: it is overloaded system-wide and
    /// has parked this connection until a slot frees.
    Busy,
}

impl ConnectionState {
    /// States in which queued commands are popped (and either sent or
    /// answered busy locally).
    pub fn can_dispatch(self) -> bool {
        matches!(self, ConnectionState::Ready | ConnectionState::Busy)
    }

    pub fn is_connected(self) -> bool {
        matches!(
            self,
            ConnectionState::HandshakePending | ConnectionState::Ready | ConnectionState::Busy
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::HandshakePending => "handshake_pending",
            ConnectionState::Ready => "ready",
            ConnectionState::Busy => "busy",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
