//! Time-based submission: delayed one-shots and periodic series.
//!
//! Whether an executor may schedule is fixed at construction; every call
//! here checks the capability first and raises
//! [`SubmitError::SchedulingUnsupported`] rather than degrading to an
//! immediate run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::warn;

use crate::TaskPin;
use crate::engine::Engine;
use crate::error::SubmitError;
use crate::executor::Executor;
use crate::priority::Priority;
use crate::receipt::{Receipt, VoidReceipt};
use crate::state::TaskState;
use crate::task::{TaskCell, signalled};

/// Spacing rule for a periodic series.
enum Cadence {
    /// Ticks anchored at `initial_delay + k * period`; a late tick catches up
    /// back-to-back, never concurrently.
    Rate(Duration),
    /// Next tick begins a fixed pause after the previous one ends.
    Delay(Duration),
}

/// Outcome of one periodic tick, reported back to the cadence driver.
enum TickEnd {
    Done(anyhow::Result<()>),
    Canceled,
    Interrupted,
}

impl Executor {
    fn require_scheduling(&self) -> Result<(), SubmitError> {
        if self.engine.supports_scheduling() {
            Ok(())
        } else {
            Err(SubmitError::SchedulingUnsupported)
        }
    }

    /// Submits work that becomes enabled after `delay`. Until then the
    /// receipt reads `Waiting` and [`Receipt::delay`] reports the remaining
    /// time; cancellation before the fire instant means the work never runs.
    pub fn schedule<T, F>(&self, work: F, delay: Duration) -> Result<Receipt<T>, SubmitError>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.require_scheduling()?;
        self.submit_inner(Priority::default(), Box::pin(work), Some(delay))
    }

    /// Submits work that becomes enabled at `at`; an instant already passed
    /// means as soon as possible.
    pub fn schedule_at<T, F>(&self, work: F, at: Instant) -> Result<Receipt<T>, SubmitError>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.schedule(work, at.saturating_duration_since(Instant::now()))
    }

    /// Runs `make_work` repeatedly, anchored at `initial_delay + k * period`.
    ///
    /// Ticks never overlap: a tick longer than `period` delays the series,
    /// which then fires back-to-back until it has caught up. A tick that
    /// raises permanently suppresses all later ticks and the series receipt
    /// goes `Failed` with that error; receipt holders get no other
    /// notification.
    pub fn schedule_at_rate<F, Fut>(
        &self,
        make_work: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<VoidReceipt, SubmitError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.schedule_periodic(make_work, initial_delay, Cadence::Rate(period))
    }

    /// Runs `make_work` repeatedly, each tick beginning `delay` after the
    /// previous one ended. Same cancellation and failure-suppression rules
    /// as [`schedule_at_rate`](Self::schedule_at_rate).
    pub fn schedule_with_delay<F, Fut>(
        &self,
        make_work: F,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<VoidReceipt, SubmitError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.schedule_periodic(make_work, initial_delay, Cadence::Delay(delay))
    }

    fn schedule_periodic<F, Fut>(
        &self,
        mut make_work: F,
        initial_delay: Duration,
        cadence: Cadence,
    ) -> Result<VoidReceipt, SubmitError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.require_scheduling()?;
        if self.engine.is_closed() {
            return Err(SubmitError::ShutDown);
        }
        let first_fire = Instant::now() + initial_delay;
        let cell: Arc<TaskCell<()>> = Arc::new(TaskCell::new_series(Some(first_fire)));
        let engine = self.engine.clone();
        let driver_cell = cell.clone();
        // the driver owns the cadence; ticks occupy engine workers only
        // while they run
        tokio::spawn(async move {
            let mut cancel = driver_cell.cancel_signal();
            let mut halt = driver_cell.halt_signal();
            let mut next = first_fire;
            let mut first = true;
            loop {
                tokio::select! {
                    biased;
                    _ = signalled(&mut cancel) => break,
                    _ = signalled(&mut halt) => break,
                    _ = tokio::time::sleep_until(next) => {}
                }
                if first {
                    if !driver_cell.advance(TaskState::Waiting, TaskState::Executing) {
                        break;
                    }
                    first = false;
                }
                if driver_cell.state() != TaskState::Executing {
                    break;
                }
                driver_cell.clear_fire_at();
                match run_tick(&engine, &driver_cell, make_work()).await {
                    TickEnd::Done(Ok(())) => {}
                    TickEnd::Done(Err(error)) => {
                        warn!(%error, "periodic task failed, suppressing further runs");
                        driver_cell.fail(error);
                        break;
                    }
                    TickEnd::Canceled => break,
                    TickEnd::Interrupted => {
                        driver_cell
                            .advance(TaskState::Executing, TaskState::CanceledExecuting);
                        break;
                    }
                }
                next = match cadence {
                    Cadence::Rate(period) => next + period,
                    Cadence::Delay(delay) => Instant::now() + delay,
                };
                driver_cell.set_fire_at(next);
            }
            driver_cell.clear_fire_at();
        });
        Ok(Receipt::new(cell).into())
    }
}

/// Runs one tick through the engine and waits for its outcome. The tick
/// itself listens for the series cancel request and the engine-wide
/// interrupt, so a running tick stops at its next suspension point.
async fn run_tick<Fut>(engine: &Engine, cell: &Arc<TaskCell<()>>, tick: Fut) -> TickEnd
where
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (done_tx, done_rx) = oneshot::channel();
    let mut tick_cancel = cell.cancel_signal();
    let mut tick_interrupt = engine.interrupt_signal();
    let run: TaskPin = Box::pin(async move {
        tokio::select! {
            biased;
            _ = signalled(&mut tick_cancel) => {
                let _ = done_tx.send(TickEnd::Canceled);
            }
            _ = signalled(&mut tick_interrupt) => {
                let _ = done_tx.send(TickEnd::Interrupted);
            }
            outcome = tick => {
                let _ = done_tx.send(TickEnd::Done(outcome));
            }
        }
    });
    if let Err(error) = engine.dispatch(engine.submission(Priority::default(), run)) {
        return match error {
            SubmitError::ShutDown => TickEnd::Interrupted,
            other => TickEnd::Done(Err(other.into())),
        };
    }
    // a tick drained by shutdown_now is dropped without reporting
    done_rx.await.unwrap_or(TickEnd::Interrupted)
}
