// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the multiplexer.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// Commands waiting in the queue, not yet sent to the backend.
    pub static ref QUEUE_DEPTH: Gauge =
        register_gauge!("searchmux_queue_depth", "Number of commands waiting to be sent to the backend.").unwrap();
    /// A boolean gauge indicating if the backend connection is established.
    pub static ref BACKEND_CONNECTED: Gauge =
        register_gauge!("searchmux_backend_connected", "Backend connection established (1 for true, 0 for false).").unwrap();

    // --- Counters ---
    pub static ref COMMANDS_SUBMITTED_TOTAL: Counter =
        register_counter!("searchmux_commands_submitted_total", "Total number of commands accepted into the queue.").unwrap();
    pub static ref COMMANDS_DISPATCHED_TOTAL: Counter =
        register_counter!("searchmux_commands_dispatched_total", "Total number of commands written to the backend.").unwrap();
    /// Busy answers, whether sent by the backend or produced locally while the backend is overloaded.
    pub static ref BUSY_REPLIES_TOTAL: Counter =
        register_counter!("searchmux_busy_replies_total", "Total number of commands answered with busy.").unwrap();
    /// Failed commands, labeled by error kind.
    pub static ref COMMAND_FAILURES_TOTAL: CounterVec =
        register_counter_vec!("searchmux_command_failures_total", "Total number of failed commands, labeled by kind.", &["kind"]).unwrap();
    pub static ref BACKEND_RECONNECTS_TOTAL: Counter =
        register_counter!("searchmux_backend_reconnects_total", "Total number of backend connection attempts after the first.").unwrap();

    // --- Histograms ---
    /// Time from writing a command to receiving its complete reply.
    pub static ref COMMAND_LATENCY_SECONDS: Histogram =
        register_histogram!("searchmux_command_latency_seconds", "Backend round-trip latency of commands in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
