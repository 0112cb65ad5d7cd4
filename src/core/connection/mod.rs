// src/core/connection/mod.rs

//! Lifecycle of the single persistent backend connection:
//! `Disconnected -> Connecting -> HandshakePending -> {Ready | Busy}`.

pub mod handle;
pub mod session;
pub mod state;
pub mod worker;

pub use handle::MuxHandle;
pub use session::BackendSession;
pub use state::ConnectionState;
pub use worker::BackendWorker;
