//! Handles for waiting on task results.
//!
//! A bounded wait folds every failure mode into one `Timeout` error: the deadline
//! passing, the task panicking, the task being dropped before it ran, and (for tasks
//! returning `Result`) the task's own error. Callers therefore only need to handle a
//! single error shape at the join point.

use std::{
    any::Any,
    time::{Duration, Instant},
};

use chdata_common::{Result, error::Error};

use crate::oneshot::{self, OneshotReceiver, Received};

type TaskOutcome<R> = std::thread::Result<R>;

/// A handle for waiting on the result of a pool task.
///
/// ## Lifecycle
///
/// 1. **Pending**: the task is queued or running
/// 2. **Ready**: the task finished, returned or panicked
/// 3. **Consumed**: the result was taken by one of the `join` methods
pub struct JoinHandle<R>(OneshotReceiver<TaskOutcome<R>>);

impl<R> std::fmt::Debug for JoinHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinHandle")
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl<R> JoinHandle<R> {
    pub(crate) fn new(rx: OneshotReceiver<TaskOutcome<R>>) -> JoinHandle<R> {
        JoinHandle(rx)
    }

    /// Creates a handle that is immediately ready with the given result.
    pub fn ready(res: R) -> Self {
        Self(oneshot::ready(Ok(res)))
    }

    /// Returns `true` if the task has finished.
    pub fn is_ready(&self) -> bool {
        !self.0.is_pending()
    }

    /// Waits for the task without a deadline.
    ///
    /// # Returns
    ///
    /// The task's return value, or `InvalidOperation` if the task panicked or was
    /// dropped before it ran.
    pub fn join(self) -> Result<R> {
        match self.0.recv() {
            Received::Value(Ok(value)) => Ok(value),
            Received::Value(Err(payload)) => Err(Error::invalid_operation(format!(
                "task panicked: {}",
                panic_message(payload.as_ref())
            ))),
            _ => Err(Error::invalid_operation("task dropped before completion")),
        }
    }

    /// Waits for the task for at most `timeout`.
    ///
    /// # Returns
    ///
    /// The task's return value, or a `Timeout` error if the deadline passed, the task
    /// panicked or the task was dropped. The error carries `timeout` in milliseconds.
    pub fn join_timeout(self, timeout: Duration) -> Result<R> {
        let millis = timeout.as_millis() as u64;
        let deadline = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400 * 365));
        match self.0.recv_deadline(deadline) {
            Received::Value(Ok(value)) => Ok(value),
            Received::Value(Err(payload)) => Err(Error::timeout_with_source(
                "task failed",
                millis,
                format!("task panicked: {}", panic_message(payload.as_ref())),
            )),
            Received::TimedOut => Err(Error::timeout(
                format!("task did not complete within {millis} ms"),
                millis,
            )),
            Received::Abandoned | Received::Consumed => Err(Error::timeout(
                "task dropped before completion",
                millis,
            )),
        }
    }

    /// Waits for all handles in order and collects their results.
    pub fn join_all(handles: impl IntoIterator<Item = JoinHandle<R>>) -> Result<Vec<R>> {
        handles.into_iter().map(|h| h.join()).collect()
    }
}

impl<T> JoinHandle<Result<T>> {
    /// Like [`join_timeout`](Self::join_timeout), but also folds the task's own error
    /// into the `Timeout` error as its source.
    pub fn wait(self, timeout: Duration) -> Result<T> {
        let millis = timeout.as_millis() as u64;
        match self.join_timeout(timeout)? {
            Ok(value) => Ok(value),
            Err(e) => Err(Error::timeout_with_source("task failed", millis, e)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
