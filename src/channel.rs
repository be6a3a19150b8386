//! # Message channel between a supervisor handle and its execution context.
//!
//! Each run gets a fresh pair of endpoints:
//!
//! ```text
//!  supervisor handle                    execution context
//!  ─────────────────                    ─────────────────
//!  send_message ──── to_context ──────▶ MessagePort::recv / try_recv
//!  on_message_ready ◀── from_context ── MessagePort::send
//! ```
//!
//! The supervisor-facing half ([`MessagePeer`]) is crate-internal: its sender
//! is held by the run record behind `send_message`, its receiver is owned by
//! the message listener task. The context-facing half ([`MessagePort`]) is
//! handed to `on_start` / `work` / `on_stop` by the work loop.
//!
//! ## Rules
//! - Both directions are unbounded; `send` never waits.
//! - Endpoints close by being dropped. A closed peer turns `send` into
//!   [`SendError`] and `recv` into `None`.
//! - Ports are per-run: a new generation never sees a prior generation's
//!   traffic.

use tokio::sync::mpsc;

use crate::error::SendError;

/// Context-side endpoint of the message channel.
///
/// Work loops thread `&mut MessagePort<M>` through `on_start`, `work` and
/// `on_stop`. The usual idiom inside `work` is a drain-poll:
///
/// ```ignore
/// while let Some(msg) = port.try_recv() {
///     // react to supervisor input, e.g. reset a counter
/// }
/// ```
pub struct MessagePort<M> {
    to_supervisor: mpsc::UnboundedSender<M>,
    from_supervisor: mpsc::UnboundedReceiver<M>,
}

impl<M> MessagePort<M> {
    /// Sends a message up to the supervisor, where the worker's
    /// `on_message_ready` callback receives it.
    pub fn send(&self, message: M) -> Result<(), SendError<M>> {
        self.to_supervisor
            .send(message)
            .map_err(|e| SendError(e.0))
    }

    /// Awaits the next supervisor message.
    ///
    /// Returns `None` once the supervisor handle is gone.
    pub async fn recv(&mut self) -> Option<M> {
        self.from_supervisor.recv().await
    }

    /// Returns the next supervisor message without waiting, or `None` if
    /// nothing is pending.
    pub fn try_recv(&mut self) -> Option<M> {
        self.from_supervisor.try_recv().ok()
    }
}

/// Supervisor-side endpoints of the message channel, split by the run
/// record: `to_context` backs `send_message`, `from_context` feeds the
/// message listener task.
pub(crate) struct MessagePeer<M> {
    pub(crate) to_context: mpsc::UnboundedSender<M>,
    pub(crate) from_context: mpsc::UnboundedReceiver<M>,
}

/// Creates a fresh message channel for one run.
pub(crate) fn message_pair<M>() -> (MessagePort<M>, MessagePeer<M>) {
    let (to_context, from_supervisor) = mpsc::unbounded_channel();
    let (to_supervisor, from_context) = mpsc::unbounded_channel();
    (
        MessagePort {
            to_supervisor,
            from_supervisor,
        },
        MessagePeer {
            to_context,
            from_context,
        },
    )
}
