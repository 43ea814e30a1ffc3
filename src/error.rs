use std::sync::Arc;

use thiserror::Error;

/// A failure captured from a unit of work, shared between all receipt holders.
pub type TaskError = Arc<anyhow::Error>;

/// Raised synchronously at the submission call site when the engine rejects a
/// unit of work. Submission never blocks: it either enqueues or fails.
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    #[error("task queue is full")]
    QueueFull,
    #[error("executor is shut down")]
    ShutDown,
    #[error("this executor does not support scheduling")]
    SchedulingUnsupported,
}

/// Raised by awaiting paths. A task-body failure stays contained in its
/// task/receipt pair; only a value receipt's `await_result` re-raises it as
/// [`AwaitError::Failed`].
#[derive(Debug, Clone, Error)]
pub enum AwaitError {
    #[error("task failed: {0}")]
    Failed(TaskError),
    #[error("task was canceled before it started")]
    Canceled,
    #[error("task was canceled while executing")]
    CanceledExecuting,
    #[error("timed out before the task reached a terminal state")]
    Timeout,
    #[error("the task result was already taken")]
    ResultTaken,
    #[error("no task completed successfully")]
    NoneSucceeded,
    #[error(transparent)]
    Submit(#[from] SubmitError),
}
