// src/core/mod.rs

//! The central module containing the multiplexer core: wire protocol,
//! single-flight dispatcher, and backend connection lifecycle.

pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod metrics;
pub mod protocol;

pub use client::{SearchClient, SearchOutcome, SnippetOutcome};
pub use connection::{BackendWorker, ConnectionState, MuxHandle};
pub use dispatcher::{CommandSink, Completion, Dispatcher};
pub use errors::MuxError;
pub use protocol::{Reply, ResultRow};
