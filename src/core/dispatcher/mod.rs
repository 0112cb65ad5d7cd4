// src/core/dispatcher/mod.rs

//! The single-flight command dispatcher.
//!
//! `Dispatcher` owns the FIFO command queue, the one "outstanding command"
//! slot, and the current `ConnectionState`. It performs no I/O of its own:
//! command lines are handed to a `CommandSink`, and backend lines are pushed in
//! through `on_line`. Because every method takes `&mut self`, whoever owns the
//! dispatcher serializes all of its state transitions; the backend worker owns
//! it on a single task.

pub mod command;

pub use command::{CommandId, CommandResult, Completion, PendingCommand};

use crate::core::MuxError;
use crate::core::connection::ConnectionState;
use crate::core::metrics;
use crate::core::protocol::{Reply, Step};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Destination for outgoing command lines.
pub trait CommandSink {
    /// Queues one command line (without terminator) for the backend.
    fn send_line(&mut self, line: &str) -> Result<(), MuxError>;
}

impl CommandSink for Vec<String> {
    fn send_line(&mut self, line: &str) -> Result<(), MuxError> {
        self.push(line.to_string());
        Ok(())
    }
}

/// Source of the current time, injected so that timeouts can be tested.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Reads tokio's clock, which honours `tokio::time::pause`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug)]
pub struct Dispatcher<C: Clock = TokioClock> {
    queue: VecDeque<PendingCommand>,
    outstanding: Option<PendingCommand>,
    state: ConnectionState,
    next_id: CommandId,
    command_timeout: Option<Duration>,
    clock: C,
}

impl Dispatcher<TokioClock> {
    pub fn new() -> Self {
        Self::with_clock(TokioClock)
    }
}

impl Default for Dispatcher<TokioClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Dispatcher<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            queue: VecDeque::new(),
            outstanding: None,
            state: ConnectionState::Disconnected,
            next_id: 0,
            command_timeout: None,
            clock,
        }
    }

    /// Enables the outstanding-command timeout. `None` waits forever.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn outstanding_id(&self) -> Option<CommandId> {
        self.outstanding.as_ref().map(PendingCommand::id)
    }

    pub fn outstanding(&self) -> Option<&PendingCommand> {
        self.outstanding.as_ref()
    }

    /// Number of commands currently in `AwaitingHeader`/`AwaitingBody`.
    pub fn outstanding_count(&self) -> usize {
        usize::from(self.outstanding.is_some())
    }

    /// Ids of the queued commands, head first.
    pub fn queued_ids(&self) -> Vec<CommandId> {
        self.queue.iter().map(PendingCommand::id).collect()
    }

    /// Appends a command to the tail of the queue and attempts a dispatch.
    ///
    /// Never waits on the backend; the caller awaits the returned handle.
    /// Text carrying a line terminator is rejected here and never queued.
    pub fn submit(
        &mut self,
        text: impl Into<String>,
        sink: &mut impl CommandSink,
    ) -> Result<Completion, MuxError> {
        let text = text.into();
        if text.contains(['\n', '\r']) {
            return Err(MuxError::Validation(
                "command text must not contain line terminators".to_string(),
            ));
        }

        let id = self.next_id;
        self.next_id += 1;
        let (command, completion) = PendingCommand::new(id, text, self.clock.now());
        debug!("Queued command #{} ({} ahead)", id, self.queue.len());
        self.queue.push_back(command);
        metrics::COMMANDS_SUBMITTED_TOTAL.inc();
        self.update_queue_gauge();

        self.dispatch_next(sink);
        Ok(completion)
    }

    /// Sends the head of the queue if the slot is free and the connection allows.
    ///
    /// While the backend is `Busy` every queued command is answered with
    /// `Reply::Busy` locally and nothing is written, so an overload drains the
    /// queue instead of stalling it.
    pub fn dispatch_next(&mut self, sink: &mut impl CommandSink) {
        while self.outstanding.is_none() && self.state.can_dispatch() {
            let Some(mut command) = self.queue.pop_front() else {
                break;
            };
            self.update_queue_gauge();

            if command.is_abandoned() {
                debug!("Dropping command #{}: caller went away", command.id());
                command.resolve(Err(MuxError::Cancelled));
                continue;
            }

            if self.state == ConnectionState::Busy {
                debug!("Backend busy; answering command #{} locally", command.id());
                metrics::BUSY_REPLIES_TOTAL.inc();
                command.resolve(Ok(Reply::Busy));
                continue;
            }

            command.mark_sent(self.clock.now());
            match sink.send_line(command.text()) {
                Ok(()) => {
                    debug!("Dispatched command #{}: {}", command.id(), command.text());
                    metrics::COMMANDS_DISPATCHED_TOTAL.inc();
                    self.outstanding = Some(command);
                }
                Err(e) => {
                    warn!("Failed to send command #{}: {}", command.id(), e);
                    Self::finish(&mut command, Err(e));
                }
            }
        }
    }

    /// Feeds one backend line to the outstanding command's state machine.
    ///
    /// Lines that arrive while nothing is outstanding are discarded.
    pub fn on_line(&mut self, line: &str, sink: &mut impl CommandSink) {
        let Some(command) = self.outstanding.as_mut() else {
            debug!("Discarding line with no outstanding command: {}", line);
            return;
        };

        match command.on_line(line) {
            Step::NeedMore => {}
            Step::Complete(result) => {
                if let Err(e) = &result {
                    warn!("Command #{} failed: {}", command.id(), e);
                }
                Self::finish(command, result);
                self.on_command_complete(sink);
            }
        }
    }

    /// Clears the outstanding slot and moves on to the next queued command.
    pub fn on_command_complete(&mut self, sink: &mut impl CommandSink) {
        if let Some(command) = self.outstanding.take()
            && !command.is_resolved()
        {
            // The slot must never be vacated with the caller still waiting.
            let mut command = command;
            Self::finish(
                &mut command,
                Err(MuxError::Protocol("command completed without a result".into())),
            );
        }
        self.dispatch_next(sink);
    }

    /// Sets the connection state and, if it now permits sending, dispatches.
    pub fn set_state(&mut self, state: ConnectionState, sink: &mut impl CommandSink) {
        if self.state != state {
            debug!("Backend connection state: {} -> {}", self.state, state);
        }
        self.state = state;
        self.dispatch_next(sink);
    }

    /// Fails the outstanding command (if any) and marks the connection down.
    ///
    /// Queued commands are kept for the next connection; the outstanding one is
    /// not resent, since the backend may already have acted on it.
    pub fn connection_lost(&mut self, error: MuxError) {
        if let Some(mut command) = self.outstanding.take() {
            warn!(
                "Connection lost while command #{} was outstanding: {}",
                command.id(),
                error
            );
            Self::finish(&mut command, Err(error));
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Removes a still-queued command. Commands already sent cannot be
    /// cancelled because the protocol has no cancel primitive.
    pub fn cancel(&mut self, id: CommandId) -> bool {
        let Some(pos) = self.queue.iter().position(|c| c.id() == id) else {
            return false;
        };
        if let Some(mut command) = self.queue.remove(pos) {
            command.resolve(Err(MuxError::Cancelled));
            self.update_queue_gauge();
            debug!("Cancelled queued command #{}", id);
            return true;
        }
        false
    }

    /// The instant at which the outstanding command times out, if any.
    pub fn deadline(&self) -> Option<Instant> {
        let timeout = self.command_timeout?;
        let sent_at = self.outstanding.as_ref()?.sent_at()?;
        Some(sent_at + timeout)
    }

    /// Resolves the outstanding command with `Timeout` once its deadline has
    /// passed. Returns `true` when it did; the connection should then be reset,
    /// since a late reply would otherwise be matched to the next command.
    pub fn expire_outstanding(&mut self) -> bool {
        let (Some(deadline), Some(timeout)) = (self.deadline(), self.command_timeout) else {
            return false;
        };
        if self.clock.now() < deadline {
            return false;
        }
        if let Some(mut command) = self.outstanding.take() {
            warn!("Command #{} timed out after {:?}", command.id(), timeout);
            Self::finish(&mut command, Err(MuxError::Timeout(timeout)));
            return true;
        }
        false
    }

    /// Resolves every queued and outstanding command with `error`.
    pub fn fail_all(&mut self, error: MuxError) {
        if let Some(mut command) = self.outstanding.take() {
            Self::finish(&mut command, Err(error.clone()));
        }
        while let Some(mut command) = self.queue.pop_front() {
            Self::finish(&mut command, Err(error.clone()));
        }
        self.update_queue_gauge();
    }

    fn finish(command: &mut PendingCommand, result: CommandResult) {
        if let Err(e) = &result {
            metrics::COMMAND_FAILURES_TOTAL
                .with_label_values(&[e.kind()])
                .inc();
        } else if let Some(sent_at) = command.sent_at() {
            metrics::COMMAND_LATENCY_SECONDS.observe(sent_at.elapsed().as_secs_f64());
        }
        if let Ok(Reply::Busy) = &result {
            metrics::BUSY_REPLIES_TOTAL.inc();
        }
        command.resolve(result);
    }

    fn update_queue_gauge(&self) {
        metrics::QUEUE_DEPTH.set(self.queue.len() as f64);
    }
}
