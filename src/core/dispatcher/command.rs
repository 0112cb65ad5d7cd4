// src/core/dispatcher/command.rs

//! A queued or in-flight command and the handle its caller awaits.

use crate::core::MuxError;
use crate::core::protocol::{Reply, ResponseKind, ResponseState, Stage, Step};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::time::Instant;

pub type CommandId = u64;

pub type CommandResult = Result<Reply, MuxError>;

/// One client-issued command awaiting or undergoing backend processing.
#[derive(Debug)]
pub struct PendingCommand {
    id: CommandId,
    text: String,
    /// Taken on resolution, so a command can be resolved at most once.
    completion: Option<oneshot::Sender<CommandResult>>,
    response: ResponseState,
    submitted_at: Instant,
    sent_at: Option<Instant>,
}

impl PendingCommand {
    pub fn new(id: CommandId, text: String, submitted_at: Instant) -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        let command = Self {
            id,
            text,
            completion: Some(tx),
            response: ResponseState::new(),
            submitted_at,
            sent_at: None,
        };
        (command, Completion { id, rx })
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn stage(&self) -> Stage {
        self.response.stage()
    }

    pub fn response_kind(&self) -> ResponseKind {
        self.response.kind()
    }

    pub fn expected_body_lines(&self) -> usize {
        self.response.expected_lines()
    }

    pub fn collected_lines(&self) -> &[String] {
        self.response.collected_lines()
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub fn sent_at(&self) -> Option<Instant> {
        self.sent_at
    }

    /// True once the caller has dropped its completion handle.
    pub fn is_abandoned(&self) -> bool {
        self.completion
            .as_ref()
            .is_none_or(oneshot::Sender::is_closed)
    }

    pub fn is_resolved(&self) -> bool {
        self.completion.is_none()
    }

    /// Transitions `Pending -> AwaitingHeader` as the command is written out.
    pub(crate) fn mark_sent(&mut self, now: Instant) {
        self.response.begin();
        self.sent_at = Some(now);
    }

    pub(crate) fn on_line(&mut self, line: &str) -> Step {
        self.response.on_line(line)
    }

    /// Delivers the final result. Returns `false` if the command had already
    /// been resolved; the caller having gone away still counts as resolved.
    pub(crate) fn resolve(&mut self, result: CommandResult) -> bool {
        self.response.finish();
        match self.completion.take() {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }
}

/// The caller's side of a submitted command. Resolves exactly once.
#[derive(Debug)]
pub struct Completion {
    id: CommandId,
    rx: oneshot::Receiver<CommandResult>,
}

impl Completion {
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Non-blocking check for the result. `None` means still pending.
    pub fn try_take(&mut self) -> Option<CommandResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(MuxError::Closed)),
        }
    }
}

impl Future for Completion {
    type Output = CommandResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(MuxError::Closed)))
    }
}
