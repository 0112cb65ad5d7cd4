// src/core/connection/worker.rs

//! Owns the single backend connection for its whole lifecycle.
//!
//! The worker connects, waits for the greeting, then multiplexes queued
//! commands over the connection one at a time. Every mutation of the queue, the
//! outstanding slot, and the connection state happens on this one task; request
//! handlers only talk to it through a `MuxHandle`. When the connection drops the
//! worker fails the in-flight command, keeps the queue, and reconnects with
//! exponential backoff.

use super::handle::{MuxHandle, Request};
use super::session::BackendSession;
use super::ConnectionState;
use crate::config::BackendConfig;
use crate::core::MuxError;
use crate::core::dispatcher::{CommandSink, Dispatcher};
use crate::core::metrics;
use crate::core::protocol::LineCodec;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

type BackendFramed = Framed<TcpStream, LineCodec>;

/// How a connection cycle ended without an error.
#[derive(Debug, PartialEq)]
enum CycleEnd {
    /// The backend closed the connection.
    Closed,
    /// Shutdown was requested or every handle was dropped.
    Shutdown,
}

/// Sink used while no connection exists. The dispatcher never writes to it
/// outside `Ready`.
struct Unconnected;

impl CommandSink for Unconnected {
    fn send_line(&mut self, _line: &str) -> Result<(), MuxError> {
        Err(MuxError::Connection("not connected to backend".to_string()))
    }
}

pub struct BackendWorker {
    config: BackendConfig,
    session: BackendSession,
    requests_rx: mpsc::Receiver<Request>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl BackendWorker {
    /// Creates the worker and the handle used to reach it. Nothing happens until
    /// `run` is polled.
    pub fn new(config: BackendConfig, shutdown_rx: broadcast::Receiver<()>) -> (Self, MuxHandle) {
        let (tx, requests_rx) = mpsc::channel(config.request_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let dispatcher = Dispatcher::new().with_command_timeout(config.command_timeout);
        let worker = Self {
            config,
            session: BackendSession::new(dispatcher),
            requests_rx,
            state_tx,
            shutdown_rx,
        };
        (worker, MuxHandle::new(tx, state_rx))
    }

    /// Creates the worker and spawns it onto the current runtime.
    pub fn spawn(
        config: BackendConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> (MuxHandle, JoinHandle<()>) {
        let (worker, handle) = Self::new(config, shutdown_rx);
        (handle, tokio::spawn(worker.run()))
    }

    /// The main run loop. Manages reconnection with exponential backoff.
    pub async fn run(mut self) {
        info!("Backend worker started for {}", self.config.address());
        let mut current_delay = self.config.reconnect_initial_delay;
        let mut first_attempt = true;

        loop {
            if !first_attempt {
                metrics::BACKEND_RECONNECTS_TOTAL.inc();
            }
            first_attempt = false;

            match self.connection_cycle().await {
                Ok(CycleEnd::Shutdown) => break,
                Ok(CycleEnd::Closed) => {
                    info!("Backend closed the connection.");
                    current_delay = self.config.reconnect_initial_delay;
                }
                Err(e) => warn!("Backend connection cycle failed: {}", e),
            }
            self.publish_state();

            if !self.config.reconnect {
                warn!("Reconnect is disabled; failing all pending and future commands.");
                self.session.dispatcher_mut().fail_all(MuxError::Connection(
                    "backend connection lost and reconnect is disabled".to_string(),
                ));
                self.serve_unavailable().await;
                break;
            }

            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
            let wait_time = current_delay + jitter;
            info!("Will try to reconnect to backend in {:?}", wait_time);
            if !self.backoff(wait_time).await {
                break;
            }
            current_delay = (current_delay * 2).min(self.config.reconnect_max_delay);
        }

        self.session.dispatcher_mut().fail_all(MuxError::Closed);
        self.session
            .connection_lost(MuxError::Connection("shutting down".to_string()));
        self.publish_state();
        metrics::BACKEND_CONNECTED.set(0.0);
        info!("Backend worker stopped.");
    }

    /// Manages a single connection lifecycle: connect, greet, multiplex.
    async fn connection_cycle(&mut self) -> Result<CycleEnd, MuxError> {
        self.session.connecting(&mut Unconnected);
        self.publish_state();

        let addr = self.config.address();
        info!("Connecting to backend at {}", addr);
        let stream = match self.connect(&addr).await {
            Ok(Some(stream)) => stream,
            Ok(None) => return Ok(CycleEnd::Shutdown),
            Err(e) => {
                self.session.connection_lost(e.clone());
                return Err(e);
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY on backend socket: {}", e);
        }

        let mut framed = Framed::new(stream, LineCodec::new());
        self.session.connected(&mut Unconnected);
        self.publish_state();
        metrics::BACKEND_CONNECTED.set(1.0);
        info!("Connected to backend at {}, waiting for greeting.", addr);

        let result = self.drive(&mut framed).await;
        metrics::BACKEND_CONNECTED.set(0.0);

        match result {
            Ok(end) => Ok(end),
            Err(e) => {
                let error = if e.is_connection_failure() {
                    e
                } else {
                    MuxError::Connection(e.to_string())
                };
                self.session.connection_lost(error.clone());
                Err(error)
            }
        }
    }

    /// Connects with a timeout while continuing to accept requests.
    /// `Ok(None)` means shutdown was requested in the meantime.
    async fn connect(&mut self, addr: &str) -> Result<Option<TcpStream>, MuxError> {
        let connect = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr));
        tokio::pin!(connect);

        loop {
            tokio::select! {
                res = &mut connect => {
                    return match res {
                        Ok(Ok(stream)) => Ok(Some(stream)),
                        Ok(Err(e)) => Err(MuxError::Connection(format!("failed to connect to {addr}: {e}"))),
                        Err(_) => Err(MuxError::Connection(format!(
                            "timed out connecting to {addr} after {:?}",
                            self.config.connect_timeout
                        ))),
                    };
                }
                req = self.requests_rx.recv() => {
                    if !self.on_request(req, &mut Unconnected) {
                        return Ok(None);
                    }
                }
                _ = self.shutdown_rx.recv() => return Ok(None),
            }
        }
    }

    /// Pumps lines, requests, and the command deadline for one connection.
    async fn drive(&mut self, framed: &mut BackendFramed) -> Result<CycleEnd, MuxError> {
        let mut outbox: Vec<String> = Vec::new();

        loop {
            let deadline = self.session.dispatcher().deadline();

            tokio::select! {
                line = framed.next() => match line {
                    Some(Ok(line)) => {
                        debug!("<- {}", line);
                        self.session.on_line(&line, &mut outbox);
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        self.session.connection_lost(MuxError::Connection(
                            "backend closed the connection".to_string(),
                        ));
                        return Ok(CycleEnd::Closed);
                    }
                },
                req = self.requests_rx.recv() => {
                    if !self.on_request(req, &mut outbox) {
                        return Ok(CycleEnd::Shutdown);
                    }
                }
                _ = sleep_until(deadline) => {
                    if self.session.dispatcher_mut().expire_outstanding() {
                        return Err(MuxError::Timeout(
                            self.config.command_timeout.unwrap_or_default(),
                        ));
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Backend worker shutting down.");
                    return Ok(CycleEnd::Shutdown);
                }
            }

            self.publish_state();
            for line in outbox.drain(..) {
                debug!("-> {}", line);
                framed.feed(line).await?;
            }
            framed.flush().await?;
        }
    }

    /// Waits out a reconnect delay while continuing to queue requests.
    /// Returns `false` if the worker should stop instead.
    async fn backoff(&mut self, wait_time: Duration) -> bool {
        let sleep = tokio::time::sleep(wait_time);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                req = self.requests_rx.recv() => {
                    if !self.on_request(req, &mut Unconnected) {
                        return false;
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Backend worker shutting down during backoff.");
                    return false;
                }
            }
        }
    }

    /// With reconnect disabled, rejects every request until shutdown.
    async fn serve_unavailable(&mut self) {
        loop {
            tokio::select! {
                req = self.requests_rx.recv() => match req {
                    Some(Request::Submit { reply, .. }) => {
                        let _ = reply.send(Err(MuxError::Connection(
                            "backend is unavailable".to_string(),
                        )));
                    }
                    Some(Request::Cancel { reply, .. }) => {
                        let _ = reply.send(false);
                    }
                    None => return,
                },
                _ = self.shutdown_rx.recv() => return,
            }
        }
    }

    /// Applies one request from a handle. Returns `false` once every handle is gone.
    fn on_request(&mut self, req: Option<Request>, sink: &mut impl CommandSink) -> bool {
        let Some(req) = req else {
            info!("All multiplexer handles dropped.");
            return false;
        };
        match req {
            Request::Submit { text, reply } => {
                let result = self.session.dispatcher_mut().submit(text, sink);
                // If the caller is gone its command is abandoned and skipped at dispatch.
                let _ = reply.send(result);
            }
            Request::Cancel { id, reply } => {
                let _ = reply.send(self.session.dispatcher_mut().cancel(id));
            }
        }
        true
    }

    fn publish_state(&self) {
        let state = self.session.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
