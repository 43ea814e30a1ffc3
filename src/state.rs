use std::sync::Arc;

use tokio::sync::watch;

use crate::error::TaskError;

/// Lifecycle of a submitted task.
///
/// Transitions are monotonic along
/// `Waiting → Executing → {Succeeded, Failed, CanceledExecuting}` or
/// `Waiting → Canceled`; a terminal state is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Accepted but not yet picked up by a worker.
    Waiting,
    /// A worker is running the unit of work.
    Executing,
    /// The work returned normally; the result is available.
    Succeeded,
    /// The work returned an error; it is retrievable from the receipt.
    Failed,
    /// Canceled before the work ever started.
    Canceled,
    /// Canceled after the work had started.
    CanceledExecuting,
}

impl TaskState {
    /// Whether no further transition can occur from this state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded
                | TaskState::Failed
                | TaskState::Canceled
                | TaskState::CanceledExecuting
        )
    }
}

/// State plus captured error, updated as one snapshot so every observer sees
/// the error exactly when the state reads `Failed`.
#[derive(Clone)]
struct Status {
    state: TaskState,
    error: Option<TaskError>,
}

/// The single source of truth for a task's lifecycle.
///
/// Backed by a `watch` channel: writers advance the state with a guarded
/// transition, readers take lock-free-for-them snapshots, and awaiting
/// callers suspend on the channel until a terminal state lands.
pub(crate) struct StateCell {
    tx: watch::Sender<Status>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(Status {
            state: TaskState::Waiting,
            error: None,
        });
        Self { tx }
    }

    pub(crate) fn state(&self) -> TaskState {
        self.tx.borrow().state
    }

    pub(crate) fn error(&self) -> Option<TaskError> {
        self.tx.borrow().error.clone()
    }

    /// Moves `from → to` if the cell currently holds `from`. Returns whether
    /// the transition happened; a terminal state is never overwritten.
    pub(crate) fn advance(&self, from: TaskState, to: TaskState) -> bool {
        debug_assert!(!from.is_terminal());
        self.tx.send_if_modified(|status| {
            if status.state == from {
                status.state = to;
                true
            } else {
                false
            }
        })
    }

    /// Moves `Executing → Failed`, attaching the error in the same update.
    pub(crate) fn fail(&self, error: anyhow::Error) -> bool {
        let error = Arc::new(error);
        self.tx.send_if_modified(|status| {
            if status.state == TaskState::Executing {
                status.state = TaskState::Failed;
                status.error = Some(error.clone());
                true
            } else {
                false
            }
        })
    }

    /// Suspends until the cell reaches a terminal state and returns it.
    pub(crate) async fn wait_terminal(&self) -> TaskState {
        let mut rx = self.tx.subscribe();
        let status = rx
            .wait_for(|status| status.state.is_terminal())
            .await
            .expect("sender half lives in this cell");
        status.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_along_the_success_path() {
        let cell = StateCell::new();
        assert_eq!(cell.state(), TaskState::Waiting);
        assert!(cell.advance(TaskState::Waiting, TaskState::Executing));
        assert!(cell.advance(TaskState::Executing, TaskState::Succeeded));
        assert_eq!(cell.state(), TaskState::Succeeded);
    }

    #[test]
    fn terminal_state_is_never_left() {
        let cell = StateCell::new();
        assert!(cell.advance(TaskState::Waiting, TaskState::Canceled));
        assert!(!cell.advance(TaskState::Waiting, TaskState::Executing));
        assert!(!cell.fail(anyhow::anyhow!("late failure")));
        assert_eq!(cell.state(), TaskState::Canceled);
        assert!(cell.error().is_none());
    }

    #[test]
    fn stale_transition_is_rejected() {
        let cell = StateCell::new();
        assert!(!cell.advance(TaskState::Executing, TaskState::Succeeded));
        assert_eq!(cell.state(), TaskState::Waiting);
    }

    #[test]
    fn failure_carries_the_error_in_the_same_snapshot() {
        let cell = StateCell::new();
        assert!(cell.advance(TaskState::Waiting, TaskState::Executing));
        assert!(cell.fail(anyhow::anyhow!("boom")));
        assert_eq!(cell.state(), TaskState::Failed);
        assert!(cell.error().is_some());
    }

    #[tokio::test]
    async fn wait_terminal_wakes_on_completion() {
        let cell = std::sync::Arc::new(StateCell::new());
        let waiter = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.wait_terminal().await })
        };
        assert!(cell.advance(TaskState::Waiting, TaskState::Executing));
        assert!(cell.advance(TaskState::Executing, TaskState::Succeeded));
        assert_eq!(waiter.await.unwrap(), TaskState::Succeeded);
    }
}
