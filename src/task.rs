use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::TaskPin;
use crate::error::TaskError;
use crate::state::{StateCell, TaskState};

/// Shared core of one task: lifecycle, result slot, cancel signal, and the
/// fire instant for scheduled submissions. Held by the receipt on one side
/// and the drive future on the other.
pub(crate) struct TaskCell<T> {
    state: StateCell,
    result: Mutex<Option<T>>,
    cancel: watch::Sender<bool>,
    /// Soft-stop request for a periodic series: end the series without
    /// dropping a tick already in flight.
    halt: watch::Sender<bool>,
    series: bool,
    fire_at: Mutex<Option<Instant>>,
}

impl<T> TaskCell<T> {
    pub(crate) fn new(fire_at: Option<Instant>) -> Self {
        Self::build(fire_at, false)
    }

    /// Cell for a periodic series; soft cancellation stops it between ticks.
    pub(crate) fn new_series(fire_at: Option<Instant>) -> Self {
        Self::build(fire_at, true)
    }

    fn build(fire_at: Option<Instant>, series: bool) -> Self {
        Self {
            state: StateCell::new(),
            result: Mutex::new(None),
            cancel: watch::channel(false).0,
            halt: watch::channel(false).0,
            series,
            fire_at: Mutex::new(fire_at),
        }
    }

    pub(crate) fn is_series(&self) -> bool {
        self.series
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state.state()
    }

    pub(crate) fn error(&self) -> Option<TaskError> {
        self.state.error()
    }

    pub(crate) fn advance(&self, from: TaskState, to: TaskState) -> bool {
        self.state.advance(from, to)
    }

    pub(crate) fn fail(&self, error: anyhow::Error) -> bool {
        self.state.fail(error)
    }

    /// Stores the value, then marks success. A cancellation that won the race
    /// keeps its terminal state and the value is discarded.
    pub(crate) fn succeed(&self, value: T) {
        *self.result.lock().expect("result lock poisoned") = Some(value);
        if !self.state.advance(TaskState::Executing, TaskState::Succeeded) {
            *self.result.lock().expect("result lock poisoned") = None;
        }
    }

    pub(crate) fn take_result(&self) -> Option<T> {
        self.result.lock().expect("result lock poisoned").take()
    }

    /// Signals the drive future to drop the in-flight work. Cooperative: a
    /// unit of work that never suspends runs to completion regardless.
    pub(crate) fn request_cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub(crate) fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Asks a series driver to stop before its next tick. In-flight work is
    /// left to finish.
    pub(crate) fn request_halt(&self) {
        self.halt.send_replace(true);
    }

    pub(crate) fn halt_signal(&self) -> watch::Receiver<bool> {
        self.halt.subscribe()
    }

    pub(crate) fn fire_at(&self) -> Option<Instant> {
        *self.fire_at.lock().expect("fire_at lock poisoned")
    }

    pub(crate) fn set_fire_at(&self, at: Instant) {
        *self.fire_at.lock().expect("fire_at lock poisoned") = Some(at);
    }

    pub(crate) fn clear_fire_at(&self) {
        *self.fire_at.lock().expect("fire_at lock poisoned") = None;
    }

    pub(crate) async fn wait_terminal(&self) -> TaskState {
        self.state.wait_terminal().await
    }
}

/// Type-erased view of a [`TaskCell`] used by delayed dispatch timers.
pub(crate) trait CellProbe: Send + Sync {
    fn probe_state(&self) -> TaskState;
    /// Cancels a task that never started.
    fn abort(&self);
}

impl<T: Send> CellProbe for TaskCell<T> {
    fn probe_state(&self) -> TaskState {
        self.state()
    }

    fn abort(&self) {
        self.advance(TaskState::Waiting, TaskState::Canceled);
    }
}

/// Wraps a unit of work into the erased run shape handed to engines, driving
/// the cell's state machine around it.
///
/// The work is invoked exactly once. A cell found `Canceled` on pickup is
/// skipped; any other pre-advanced state means the same unit was handed to a
/// worker twice, which is a programming error and fatal.
pub(crate) fn drive<T>(
    cell: Arc<TaskCell<T>>,
    work: BoxFuture<'static, anyhow::Result<T>>,
    interrupt: watch::Receiver<bool>,
) -> TaskPin
where
    T: Send + 'static,
{
    Box::pin(async move {
        if !cell.advance(TaskState::Waiting, TaskState::Executing) {
            if cell.state() == TaskState::Canceled {
                return;
            }
            panic!("unit of work invoked more than once");
        }
        let mut cancel = cell.cancel_signal();
        let mut interrupt = interrupt;
        // an interrupt raised before pickup targets work that was in flight
        // at the time, not a unit driven by hand afterwards
        let interrupt_armed = !*interrupt.borrow_and_update();
        tokio::select! {
            biased;
            _ = signalled(&mut cancel) => {
                // the canceler already moved the state to CanceledExecuting
            }
            _ = signalled(&mut interrupt), if interrupt_armed => {
                cell.advance(TaskState::Executing, TaskState::CanceledExecuting);
            }
            outcome = work => match outcome {
                Ok(value) => cell.succeed(value),
                Err(error) => {
                    cell.fail(error);
                }
            },
        }
    })
}

/// Resolves once the flag is raised; never resolves if the sender is gone.
pub(crate) async fn signalled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|raised| *raised).await.is_err() {
        std::future::pending::<()>().await;
    }
}
