// src/core/connection/session.rs

//! Connection-level state on top of the dispatcher: the greeting handshake and
//! the transitions between connectivity states. Performs no I/O.

use super::ConnectionState;
use crate::core::MuxError;
use crate::core::dispatcher::{Clock, CommandSink, Dispatcher, TokioClock};
use crate::core::protocol::Greeting;
use tracing::{debug, info};

#[derive(Debug)]
pub struct BackendSession<C: Clock = TokioClock> {
    dispatcher: Dispatcher<C>,
}

impl<C: Clock> BackendSession<C> {
    pub fn new(dispatcher: Dispatcher<C>) -> Self {
        Self { dispatcher }
    }

    pub fn state(&self) -> ConnectionState {
        self.dispatcher.state()
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<C> {
        &mut self.dispatcher
    }

    /// A connection attempt has started.
    pub fn connecting(&mut self, sink: &mut impl CommandSink) {
        self.dispatcher.set_state(ConnectionState::Connecting, sink);
    }

    /// The socket is up; nothing is sent until the backend greets us.
    pub fn connected(&mut self, sink: &mut impl CommandSink) {
        self.dispatcher
            .set_state(ConnectionState::HandshakePending, sink);
    }

    /// Routes one line from the backend.
    pub fn on_line(&mut self, line: &str, sink: &mut impl CommandSink) {
        match self.dispatcher.state() {
            ConnectionState::HandshakePending | ConnectionState::Busy => {
                self.on_greeting(line, sink)
            }
            ConnectionState::Ready => self.dispatcher.on_line(line, sink),
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                debug!("Discarding line received while not connected: {}", line);
            }
        }
    }

    /// The connection dropped: fail the in-flight command, keep the queue.
    pub fn connection_lost(&mut self, error: MuxError) {
        self.dispatcher.connection_lost(error);
    }

    fn on_greeting(&mut self, line: &str, sink: &mut impl CommandSink) {
        match Greeting::parse(line) {
            Greeting::Busy => {
                if self.dispatcher.state() == ConnectionState::HandshakePending {
                    info!("Backend has no free slots; waiting in its queue.");
                }
                self.dispatcher.set_state(ConnectionState::Busy, sink);
            }
            Greeting::Welcome(text) => {
                info!("Backend: {}", text);
                self.dispatcher.set_state(ConnectionState::Ready, sink);
            }
            Greeting::Other(text) => {
                debug!("Ignoring line received before the greeting: {}", text);
            }
        }
    }
}
