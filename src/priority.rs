use std::ops::Deref;

use crate::error::SubmitError;
use crate::executor::Executor;
use crate::receipt::Receipt;

/// Advisory weight of a submission in a saturated pool's run queue.
///
/// Higher priorities are picked up first; submissions of equal priority run
/// in submission order. No starvation-freedom guarantee: a steady stream of
/// `High` work keeps `Low` work queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Executor over a bounded pool whose run queue is priority-ordered.
///
/// Dereferences to [`Executor`] for the rest of the surface; submissions
/// made through the plain surface carry [`Priority::Medium`], so FIFO order
/// is preserved among them.
pub struct PriorityExecutor {
    inner: Executor,
}

impl PriorityExecutor {
    pub fn with_pool(core: usize, max: usize, queue_capacity: Option<usize>) -> Self {
        Self {
            inner: Executor::with_pool(core, max, queue_capacity),
        }
    }

    /// Submits value-bearing work at the given priority.
    pub fn submit_with<T, F>(&self, priority: Priority, work: F) -> Result<Receipt<T>, SubmitError>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.inner.submit_inner(priority, Box::pin(work), None)
    }

    /// Submits fire-and-forget work at the given priority.
    pub fn run_with<F>(&self, priority: Priority, work: F) -> Result<(), SubmitError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.run_inner(priority, work)
    }
}

impl Deref for PriorityExecutor {
    type Target = Executor;

    fn deref(&self) -> &Executor {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::watch;

    #[tokio::test]
    async fn later_high_submission_runs_before_earlier_low() {
        let executor = PriorityExecutor::with_pool(1, 1, None);
        let (started_tx, mut started_rx) = watch::channel(false);
        let (gate_tx, gate_rx) = watch::channel(false);
        // occupy the single worker so the next two submissions queue up
        executor
            .run(async move {
                started_tx.send_replace(true);
                let mut gate = gate_rx;
                let _ = gate.wait_for(|open| *open).await;
            })
            .unwrap();
        started_rx.wait_for(|started| *started).await.unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let low = {
            let order = order.clone();
            executor
                .submit_with(Priority::Low, async move {
                    order.lock().unwrap().push("low");
                    Ok(())
                })
                .unwrap()
        };
        let high = {
            let order = order.clone();
            executor
                .submit_with(Priority::High, async move {
                    order.lock().unwrap().push("high");
                    Ok(())
                })
                .unwrap()
        };

        gate_tx.send_replace(true);
        high.await_result().await.unwrap();
        low.await_result().await.unwrap();
        assert_eq!(*order.lock().unwrap(), ["high", "low"]);
    }
}
