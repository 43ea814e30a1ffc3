use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{AwaitError, TaskError};
use crate::state::TaskState;
use crate::task::TaskCell;

/// Caller-facing handle for a submitted, value-bearing task.
///
/// The receipt observes the task's own state machine; it is the single
/// source of truth for the lifecycle, finer grained than a bare future
/// (canceled-before-start and canceled-while-executing are distinct states).
/// Any number of clones of the underlying views may exist: state and error
/// reads are snapshots and never require locking by the caller.
pub struct Receipt<T> {
    cell: Arc<TaskCell<T>>,
}

impl<T> Receipt<T> {
    pub(crate) fn new(cell: Arc<TaskCell<T>>) -> Self {
        Self { cell }
    }

    /// Snapshot of the task's current state.
    pub fn state(&self) -> TaskState {
        self.cell.state()
    }

    /// The failure captured from the unit of work, present exactly when
    /// [`state`](Self::state) is [`TaskState::Failed`].
    pub fn error(&self) -> Option<TaskError> {
        self.cell.error()
    }

    /// Whether the task reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.cell.state().is_terminal()
    }

    /// Remaining time until a scheduled task becomes enabled; `None` for
    /// immediate submissions. Decreases monotonically, zero once due.
    pub fn delay(&self) -> Option<Duration> {
        self.cell
            .fire_at()
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Cancels the task, interrupting it if it is already executing.
    /// Equivalent to `cancel_with(true)`.
    pub fn cancel(&self) -> bool {
        self.cancel_with(true)
    }

    /// Cancels the task. A task that never started becomes
    /// [`TaskState::Canceled`] and will not run. With `interrupt`, a task
    /// that already started becomes [`TaskState::CanceledExecuting`]
    /// immediately and its work is dropped at the next suspension point
    /// (best effort: work that never suspends runs to completion, but its
    /// outcome is discarded). Without `interrupt`, a started one-shot task
    /// is unaffected, but a started periodic series still stops: its state
    /// flips to [`TaskState::CanceledExecuting`] and no further tick runs,
    /// while a tick already in flight finishes. Returns whether a state
    /// transition happened; terminal tasks are unaffected.
    pub fn cancel_with(&self, interrupt: bool) -> bool {
        if self
            .cell
            .advance(TaskState::Waiting, TaskState::Canceled)
        {
            return true;
        }
        if interrupt {
            if self
                .cell
                .advance(TaskState::Executing, TaskState::CanceledExecuting)
            {
                self.cell.request_cancel();
                return true;
            }
        } else if self.cell.is_series()
            && self
                .cell
                .advance(TaskState::Executing, TaskState::CanceledExecuting)
        {
            self.cell.request_halt();
            return true;
        }
        false
    }

    /// Suspends until the task is terminal and returns the terminal state,
    /// swallowing failure and cancellation.
    pub async fn await_done(&self) -> TaskState {
        self.cell.wait_terminal().await
    }

    /// Suspends until the task is terminal and returns its value.
    ///
    /// Failure re-raises the captured error; cancellation raises the matching
    /// cancellation error. The value is handed out once: a second call after
    /// success reports [`AwaitError::ResultTaken`].
    pub async fn await_result(&self) -> Result<T, AwaitError> {
        match self.cell.wait_terminal().await {
            TaskState::Succeeded => self.cell.take_result().ok_or(AwaitError::ResultTaken),
            TaskState::Failed => Err(AwaitError::Failed(
                self.cell
                    .error()
                    .expect("failed task always carries an error"),
            )),
            TaskState::Canceled => Err(AwaitError::Canceled),
            TaskState::CanceledExecuting => Err(AwaitError::CanceledExecuting),
            TaskState::Waiting | TaskState::Executing => {
                unreachable!("wait_terminal returned a non-terminal state")
            }
        }
    }

    /// As [`await_result`](Self::await_result), raising
    /// [`AwaitError::Timeout`] if the task is not terminal within `limit`.
    /// The task itself is not canceled by the timeout.
    pub async fn await_result_for(&self, limit: Duration) -> Result<T, AwaitError> {
        match tokio::time::timeout(limit, self.await_result()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AwaitError::Timeout),
        }
    }

    pub(crate) fn take_value(&self) -> Option<T> {
        self.cell.take_result()
    }
}

/// Receipt for a task submitted without interest in a value.
///
/// The awaiting calls swallow abnormal outcomes; callers inspect
/// [`state`](Self::state) and [`error`](Self::error) afterwards instead of
/// catching an error from the wait itself.
pub struct VoidReceipt {
    inner: Receipt<()>,
}

impl From<Receipt<()>> for VoidReceipt {
    fn from(inner: Receipt<()>) -> Self {
        Self { inner }
    }
}

impl VoidReceipt {
    pub fn state(&self) -> TaskState {
        self.inner.state()
    }

    pub fn error(&self) -> Option<TaskError> {
        self.inner.error()
    }

    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    pub fn delay(&self) -> Option<Duration> {
        self.inner.delay()
    }

    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    pub fn cancel_with(&self, interrupt: bool) -> bool {
        self.inner.cancel_with(interrupt)
    }

    /// Suspends until the task is terminal; failure and cancellation are
    /// swallowed and reported only through the returned state.
    pub async fn await_done(&self) -> TaskState {
        self.inner.await_done().await
    }

    /// As [`await_done`](Self::await_done), raising [`AwaitError::Timeout`]
    /// on elapse without canceling the task.
    pub async fn await_done_for(&self, limit: Duration) -> Result<TaskState, AwaitError> {
        match tokio::time::timeout(limit, self.inner.await_done()).await {
            Ok(state) => Ok(state),
            Err(_) => Err(AwaitError::Timeout),
        }
    }
}
