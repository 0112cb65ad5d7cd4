// tests/integration/test_helpers.rs

//! Test helpers: a scripted fake search backend, a running multiplexer, and an
//! in-memory driver for the HTTP router.

#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use searchmux::config::BackendConfig;
use searchmux::core::{BackendWorker, ConnectionState, MuxHandle, SearchClient};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Upper bound on any single wait in a test, so a bug fails instead of hanging.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    // Ignore the error if another test already installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A stand-in for the search backend that the test scripts line by line.
pub struct FakeBackend {
    listener: TcpListener,
    pub addr: SocketAddr,
}

impl FakeBackend {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake backend");
        let addr = listener.local_addr().expect("Fake backend has no address");
        Self { listener, addr }
    }

    /// Backend settings pointing at this fake, with fast reconnects.
    pub fn config(&self) -> BackendConfig {
        BackendConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            connect_timeout: Duration::from_secs(2),
            command_timeout: None,
            reconnect: true,
            reconnect_initial_delay: Duration::from_millis(10),
            reconnect_max_delay: Duration::from_millis(50),
            request_buffer: 64,
        }
    }

    /// Waits for the multiplexer to connect.
    pub async fn accept(&self) -> BackendConn {
        let (stream, _) = tokio::time::timeout(STEP_TIMEOUT, self.listener.accept())
            .await
            .expect("Timed out waiting for the multiplexer to connect")
            .expect("Accept failed");
        let (read, write) = stream.into_split();
        BackendConn {
            lines: BufReader::new(read).lines(),
            writer: write,
        }
    }

    /// Accepts a connection and greets it with a welcome line.
    pub async fn accept_ready(&self) -> BackendConn {
        let mut conn = self.accept().await;
        conn.send("Welcome to the search server").await;
        conn
    }
}

/// One accepted connection on the fake backend.
pub struct BackendConn {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl BackendConn {
    pub async fn send(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    pub async fn send_lines(&mut self, lines: &[&str]) {
        for line in lines {
            self.send(line).await;
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("Write failed");
        self.writer.flush().await.expect("Flush failed");
    }

    /// Reads the next command the multiplexer sent.
    pub async fn expect_command(&mut self) -> String {
        match self.next_line(STEP_TIMEOUT).await {
            Some(line) => line,
            None => panic!("Connection closed while waiting for a command"),
        }
    }

    /// Asserts that nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(line) = tokio::time::timeout(window, self.lines.next_line()).await {
            panic!("Expected no command, got {:?}", line);
        }
    }

    /// Waits for the multiplexer to close this connection.
    pub async fn expect_closed(&mut self) {
        let line = self.next_line(STEP_TIMEOUT).await;
        assert_eq!(line, None, "Expected the connection to be closed");
    }

    async fn next_line(&mut self, wait: Duration) -> Option<String> {
        tokio::time::timeout(wait, self.lines.next_line())
            .await
            .expect("Timed out waiting for the multiplexer")
            .ok()
            .flatten()
    }
}

/// A running backend worker and the client in front of it.
pub struct TestProxy {
    pub client: SearchClient,
    pub shutdown_tx: broadcast::Sender<()>,
    pub task: JoinHandle<()>,
}

impl TestProxy {
    pub fn start(config: BackendConfig) -> Self {
        init_tracing();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (handle, task) = BackendWorker::spawn(config, shutdown_rx);
        Self {
            client: SearchClient::new(handle),
            shutdown_tx,
            task,
        }
    }

    pub fn handle(&self) -> &MuxHandle {
        self.client.handle()
    }

    pub async fn wait_for_state(&self, state: ConnectionState) {
        tokio::time::timeout(STEP_TIMEOUT, self.handle().wait_for_state(state))
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for state {state}"))
            .expect("Worker stopped");
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        tokio::time::timeout(STEP_TIMEOUT, self.task)
            .await
            .expect("Worker did not stop")
            .expect("Worker panicked");
    }
}

/// Drives the router in memory, without binding a port.
pub struct TestApp {
    pub router: Router,
}

impl TestApp {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    pub async fn request(&self, req: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(req)
            .await
            .expect("Request failed")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.request(req).await
    }

    pub async fn post_json(&self, uri: &str, json: Value) -> Response<Body> {
        let body = serde_json::to_string(&json).unwrap();
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        self.request(req).await
    }

    pub async fn post_raw(
        &self,
        uri: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> Response<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let req = builder.body(Body::from(body.to_string())).unwrap();
        self.request(req).await
    }

    pub async fn get_with_origin(&self, uri: &str, origin: &str) -> Response<Body> {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .header("origin", origin)
            .body(Body::empty())
            .unwrap();
        self.request(req).await
    }

    pub async fn json_body(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub async fn body_string(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
