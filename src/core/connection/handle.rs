// src/core/connection/handle.rs

use super::ConnectionState;
use crate::core::MuxError;
use crate::core::dispatcher::{CommandId, Completion};
use tokio::sync::{mpsc, oneshot, watch};

/// Messages from handles to the backend worker.
#[derive(Debug)]
pub(crate) enum Request {
    Submit {
        text: String,
        reply: oneshot::Sender<Result<Completion, MuxError>>,
    },
    Cancel {
        id: CommandId,
        reply: oneshot::Sender<bool>,
    },
}

/// A cheap, cloneable front door to the backend worker.
///
/// Any number of tasks may submit concurrently; the worker applies their
/// requests one at a time in the order the channel delivers them.
#[derive(Debug, Clone)]
pub struct MuxHandle {
    tx: mpsc::Sender<Request>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl MuxHandle {
    pub(crate) fn new(tx: mpsc::Sender<Request>, state_rx: watch::Receiver<ConnectionState>) -> Self {
        Self { tx, state_rx }
    }

    /// Enqueues a command line and returns its completion handle.
    ///
    /// Returns as soon as the command is queued; await the `Completion` for the
    /// backend's answer.
    pub async fn submit(&self, text: impl Into<String>) -> Result<Completion, MuxError> {
        let text = text.into();
        if text.contains(['\n', '\r']) {
            return Err(MuxError::Validation(
                "command text must not contain line terminators".to_string(),
            ));
        }

        let (reply, ack) = oneshot::channel();
        self.tx
            .send(Request::Submit { text, reply })
            .await
            .map_err(|_| MuxError::Closed)?;
        ack.await.map_err(|_| MuxError::Closed)?
    }

    /// Removes a command that has not been sent yet. Returns `false` if it was
    /// already sent, finished, or unknown.
    pub async fn cancel(&self, id: CommandId) -> bool {
        let (reply, ack) = oneshot::channel();
        if self.tx.send(Request::Cancel { id, reply }).await.is_err() {
            return false;
        }
        ack.await.unwrap_or(false)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Waits until the connection reaches `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<(), MuxError> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|s| *s == state)
            .await
            .map(|_| ())
            .map_err(|_| MuxError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
