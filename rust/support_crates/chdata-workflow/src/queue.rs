//! The queue interface shared by the blocking and adaptive chunk queues.

use std::time::{Duration, Instant};

/// A FIFO queue connecting exactly one producer and one consumer.
///
/// A `timeout` of `None` waits indefinitely. Once [`close`](Self::close) is called,
/// offers fail with [`OfferError::Closed`]; polls still drain what was queued before
/// reporting [`PollError::Closed`].
pub trait ChunkQueue<T>: Send + Sync {
    /// Appends an item, waiting for room for at most `timeout`.
    fn offer(&self, item: T, timeout: Option<Duration>) -> Result<(), OfferError<T>>;

    /// Removes the oldest item, waiting for one for at most `timeout`.
    fn poll(&self, timeout: Option<Duration>) -> Result<T, PollError>;

    /// Closes the queue and wakes every waiter. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Drops every queued item.
    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current capacity, `None` when unbounded.
    fn capacity(&self) -> Option<usize>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum OfferError<T> {
    /// No room became available before the deadline. Returns the item.
    Timeout(T),
    /// The queue was closed. Returns the item.
    Closed(T),
}

impl<T> OfferError<T> {
    pub fn into_inner(self) -> T {
        match self {
            OfferError::Timeout(item) | OfferError::Closed(item) => item,
        }
    }
}

impl<T> std::fmt::Display for OfferError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfferError::Timeout(_) => write!(f, "queue is full"),
            OfferError::Closed(_) => write!(f, "queue is closed"),
        }
    }
}

impl<T: std::fmt::Debug> std::error::Error for OfferError<T> {}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PollError {
    Timeout,
    /// The queue is closed and drained.
    Closed,
}

impl std::fmt::Display for PollError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollError::Timeout => write!(f, "queue is empty"),
            PollError::Closed => write!(f, "queue is closed"),
        }
    }
}

impl std::error::Error for PollError {}

/// Converts an optional timeout into an optional deadline.
pub(crate) fn deadline(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|t| Instant::now().checked_add(t))
}

/// Time left until `deadline`; `None` for no deadline.
pub(crate) fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}
