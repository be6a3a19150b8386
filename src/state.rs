//! # Lifecycle state shared between a worker handle and its execution context.
//!
//! [`StateCell`] is the one piece of data both sides of a worker mutate: the
//! supervisor handle writes it to request a stop, the execution context reads
//! it at every loop iteration and writes it once when finalizing a
//! drain-then-stop. Everything else crosses the boundary through channels.
//!
//! ## Rules
//! - Reads and writes are atomic; no lock is involved.
//! - `Stopped` is terminal for a run: the only path back to `Started` is
//!   `start_new`, which owns the crate-private [`StateCell::set_started`].
//! - `set_stopped` is idempotent and safe to call from either side.
//! - `StopAtQueueEnd` is a consumer-only request; a producer loop treats it
//!   like `Started` and keeps working.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle phase of a worker run.
///
/// The discriminants are stable and part of the state encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No work iterations happen; the current run (if any) is winding down.
    Stopped = 1,
    /// The work loop is live.
    Started = 2,
    /// Graceful drain requested: the consumer flushes its buffer once more,
    /// then moves itself to `Stopped`.
    StopAtQueueEnd = 3,
}

impl LifecycleState {
    /// Returns a short stable label (snake_case) for use in warnings.
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Started => "started",
            LifecycleState::StopAtQueueEnd => "stop_at_queue_end",
        }
    }

    fn decode(raw: u8) -> LifecycleState {
        match raw {
            2 => LifecycleState::Started,
            3 => LifecycleState::StopAtQueueEnd,
            _ => LifecycleState::Stopped,
        }
    }
}

/// Atomic cell holding a [`LifecycleState`], shared via `Arc` between the
/// supervisor side and the execution context.
///
/// A work function receives `&StateCell` and may call [`StateCell::set_stopped`]
/// to end its own loop cooperatively.
#[derive(Debug)]
pub struct StateCell {
    inner: AtomicU8,
}

impl StateCell {
    /// Creates a new cell in the `Stopped` state.
    pub fn new() -> Self {
        Self {
            inner: AtomicU8::new(LifecycleState::Stopped as u8),
        }
    }

    /// Returns the current state.
    #[inline]
    pub fn get(&self) -> LifecycleState {
        LifecycleState::decode(self.inner.load(Ordering::SeqCst))
    }

    /// True if the current state is `Stopped`.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.get() == LifecycleState::Stopped
    }

    /// Requests an immediate stop. Idempotent.
    #[inline]
    pub fn set_stopped(&self) {
        self.inner
            .store(LifecycleState::Stopped as u8, Ordering::SeqCst);
    }

    /// Requests a drain-then-stop (consumer loops flush once, then stop).
    #[inline]
    pub fn set_stop_at_queue_end(&self) {
        self.inner
            .store(LifecycleState::StopAtQueueEnd as u8, Ordering::SeqCst);
    }

    /// Marks the start of a new run. Only `start_new` may do this, which is
    /// what keeps `Stopped` terminal for everyone else.
    #[inline]
    pub(crate) fn set_started(&self) {
        self.inner
            .store(LifecycleState::Started as u8, Ordering::SeqCst);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
