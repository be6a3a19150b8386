//! Error types used by worker handles and ready queues.
//!
//! This module defines:
//!
//! - [`WorkerError`] — supervisor-side misuse of a worker handle.
//! - [`SendError`] — a message sent into a handle with no live run.
//! - [`PutError`] / [`GetError`] — non-blocking / bounded-wait queue failures.
//!
//! The payload-carrying types (`SendError`, `PutError`) hand the rejected
//! value back to the caller, so they deliberately avoid `T: Debug` bounds and
//! implement `Debug`/`Display` by hand.

use std::fmt;
use thiserror::Error;

/// # Errors produced by worker handle operations.
///
/// These represent misuse of the supervisor-side API, such as starting a
/// producer that has nowhere to publish.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WorkerError {
    /// `start_new` was called on a producer with an empty subscriber set.
    #[error("producer has no subscribers; call set_subscribers before start_new")]
    NoSubscribers,

    /// `set_subscribers` was called while a run is live; the subscriber set is
    /// only mutable between runs.
    #[error("subscriber set is locked while a run is live")]
    SubscribersLocked,
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in warnings.
    ///
    /// # Example
    /// ```
    /// use prodcon::WorkerError;
    ///
    /// assert_eq!(WorkerError::NoSubscribers.as_label(), "no_subscribers");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::NoSubscribers => "no_subscribers",
            WorkerError::SubscribersLocked => "subscribers_locked",
        }
    }
}

/// A message could not be delivered because the peer end of the message
/// channel is gone: either the handle has no live run, or the supervisor
/// handle was dropped out from under the execution context.
///
/// The undelivered message is returned to the caller in field `0`.
pub struct SendError<M>(pub M);

impl<M> SendError<M> {
    /// Consumes the error, returning the undelivered message.
    pub fn into_inner(self) -> M {
        self.0
    }
}

impl<M> fmt::Debug for SendError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SendError").finish()
    }
}

impl<M> fmt::Display for SendError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message channel closed; peer is gone")
    }
}

impl<M> std::error::Error for SendError<M> {}

/// A put into a [`ReadyQueue`](crate::ReadyQueue) failed; the rejected item is
/// carried inside so the caller can retry or drop it deliberately.
///
/// Lossy queues never produce this error: they evict the oldest item instead.
pub enum PutError<T> {
    /// The queue was at capacity (`try_put`).
    Full(T),
    /// The queue stayed at capacity for the whole wait (`put_timeout`).
    Timeout(T),
}

impl<T> PutError<T> {
    /// Consumes the error, returning the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            PutError::Full(item) | PutError::Timeout(item) => item,
        }
    }

    /// Returns a short stable label (snake_case) for use in warnings.
    pub fn as_label(&self) -> &'static str {
        match self {
            PutError::Full(_) => "queue_full",
            PutError::Timeout(_) => "put_timeout",
        }
    }
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::Full(_) => f.debug_tuple("Full").finish(),
            PutError::Timeout(_) => f.debug_tuple("Timeout").finish(),
        }
    }
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::Full(_) => write!(f, "queue is full"),
            PutError::Timeout(_) => write!(f, "queue stayed full until the deadline"),
        }
    }
}

impl<T> std::error::Error for PutError<T> {}

/// # Errors produced by non-blocking or bounded-wait queue reads.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetError {
    /// The queue held no item (`try_get`).
    #[error("queue is empty")]
    Empty,

    /// No item arrived before the deadline (`get_timeout`).
    #[error("queue stayed empty until the deadline")]
    Timeout,
}

impl GetError {
    /// Returns a short stable label (snake_case) for use in warnings.
    ///
    /// # Example
    /// ```
    /// use prodcon::GetError;
    ///
    /// assert_eq!(GetError::Timeout.as_label(), "get_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            GetError::Empty => "queue_empty",
            GetError::Timeout => "get_timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(WorkerError::NoSubscribers.as_label(), "no_subscribers");
        assert_eq!(
            WorkerError::SubscribersLocked.as_label(),
            "subscribers_locked"
        );
        assert_eq!(GetError::Empty.as_label(), "queue_empty");
        assert_eq!(GetError::Timeout.as_label(), "get_timeout");
        assert_eq!(PutError::Full(0u8).as_label(), "queue_full");
        assert_eq!(PutError::Timeout(0u8).as_label(), "put_timeout");
    }

    #[test]
    fn test_payload_recovery() {
        let err = PutError::Full("item");
        assert_eq!(err.into_inner(), "item");
        let err: SendError<u32> = SendError(7);
        assert_eq!(err.into_inner(), 7);
    }

    #[test]
    fn test_debug_without_payload_bounds() {
        struct Opaque;
        let err = PutError::Full(Opaque);
        assert_eq!(format!("{err:?}"), "Full");
        let err = SendError(Opaque);
        assert_eq!(format!("{err:?}"), "SendError");
    }
}
