use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::task::Spawn;
use tokio::runtime::Handle;
use tokio::time::Instant;

use crate::TaskPin;
use crate::adapt::TokioSpawner;
use crate::engine::{Engine, PoolConfig};
use crate::error::{AwaitError, SubmitError};
use crate::priority::Priority;
use crate::receipt::{Receipt, VoidReceipt};
use crate::state::TaskState;
use crate::task::{TaskCell, drive};

/// The main execution façade.
///
/// An executor owns exactly one engine for its lifetime; the pool shape,
/// queue bound, and scheduling capability are fixed at construction. All
/// submission paths are non-blocking: the engine either accepts the work or
/// the call returns a [`SubmitError`] synchronously. Dropping the executor
/// requests shutdown; work already accepted still runs.
pub struct Executor {
    pub(crate) engine: Engine,
}

impl Executor {
    /// Worker-per-task executor: no resident workers, a transient worker per
    /// queued submission, no queue bound, no scheduling.
    pub fn new() -> Self {
        Self {
            engine: Engine::pool(
                PoolConfig {
                    core: 0,
                    max: usize::MAX,
                    queue_capacity: None,
                },
                false,
            ),
        }
    }

    /// As [`new`](Self::new), but scheduling-capable.
    pub fn new_scheduler() -> Self {
        Self {
            engine: Engine::pool(
                PoolConfig {
                    core: 0,
                    max: usize::MAX,
                    queue_capacity: None,
                },
                true,
            ),
        }
    }

    /// Bounded pool: `core` resident workers, transient growth up to `max`
    /// when all workers are busy, and an optional queue bound enforced at
    /// submission. Not scheduling-capable.
    pub fn with_pool(core: usize, max: usize, queue_capacity: Option<usize>) -> Self {
        Self {
            engine: Engine::pool(
                PoolConfig {
                    core,
                    max,
                    queue_capacity,
                },
                false,
            ),
        }
    }

    /// Runs every submission on a caller-supplied engine instead of an owned
    /// pool. `supports_scheduling` declares whether the engine may be used
    /// for delayed and periodic submission.
    pub fn from_spawner<S>(spawner: S, supports_scheduling: bool) -> Self
    where
        S: Spawn + Send + Sync + 'static,
    {
        Self {
            engine: Engine::spawner(spawner, supports_scheduling),
        }
    }

    /// Runs every submission directly on a tokio runtime. Scheduling-capable.
    pub fn from_handle(handle: Handle) -> Self {
        Self::from_spawner(TokioSpawner::new(handle), true)
    }

    /// Submits fire-and-forget work. The work is still wrapped in a task, so
    /// an engine-wide interrupt stops it like any other submission.
    pub fn run<F>(&self, work: F) -> Result<(), SubmitError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.run_inner(Priority::default(), work)
    }

    pub(crate) fn run_inner<F>(&self, priority: Priority, work: F) -> Result<(), SubmitError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cell: Arc<TaskCell<()>> = Arc::new(TaskCell::new(None));
        let run = drive(
            cell,
            Box::pin(async move {
                work.await;
                Ok(())
            }),
            self.engine.interrupt_signal(),
        );
        self.engine.dispatch(self.engine.submission(priority, run))
    }

    /// Submits value-bearing work and returns its receipt.
    pub fn submit<T, F>(&self, work: F) -> Result<Receipt<T>, SubmitError>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.submit_inner(Priority::default(), Box::pin(work), None)
    }

    /// Submits work without a value and returns a receipt that only reports
    /// the lifecycle.
    pub fn submit_void<F>(&self, work: F) -> Result<VoidReceipt, SubmitError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let receipt = self.submit_inner(
            Priority::default(),
            Box::pin(async move {
                work.await;
                Ok(())
            }),
            None,
        )?;
        Ok(receipt.into())
    }

    pub(crate) fn submit_inner<T>(
        &self,
        priority: Priority,
        work: BoxFuture<'static, anyhow::Result<T>>,
        fire_after: Option<Duration>,
    ) -> Result<Receipt<T>, SubmitError>
    where
        T: Send + 'static,
    {
        let fire_at = fire_after.map(|delay| Instant::now() + delay);
        let cell = Arc::new(TaskCell::new(fire_at));
        let run = drive(cell.clone(), work, self.engine.interrupt_signal());
        let sub = self.engine.submission(priority, run);
        match fire_after {
            Some(delay) => self.engine.dispatch_after(sub, delay, cell.clone())?,
            None => self.engine.dispatch(sub)?,
        }
        Ok(Receipt::new(cell))
    }

    /// Submits every unit of work, waits until all of them are terminal, and
    /// returns the receipts in input order.
    ///
    /// A submission failure mid-batch cancels the already-submitted prefix
    /// and raises it; no partial batch is left running.
    pub async fn execute_all<T, F>(&self, works: Vec<F>) -> Result<Vec<Receipt<T>>, AwaitError>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let receipts = self.submit_batch(works)?;
        futures::future::join_all(receipts.iter().map(Receipt::await_done)).await;
        Ok(receipts)
    }

    /// As [`execute_all`](Self::execute_all), but waits at most `limit`.
    /// Tasks still live on elapse are canceled, so every returned receipt is
    /// terminal either way.
    pub async fn execute_all_within<T, F>(
        &self,
        works: Vec<F>,
        limit: Duration,
    ) -> Result<Vec<Receipt<T>>, AwaitError>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let receipts = self.submit_batch(works)?;
        let all_done = futures::future::join_all(receipts.iter().map(Receipt::await_done));
        if tokio::time::timeout(limit, all_done).await.is_err() {
            for receipt in &receipts {
                receipt.cancel();
            }
        }
        Ok(receipts)
    }

    /// Submits every unit of work and returns the value of the first one to
    /// succeed; all siblings are canceled on every return path. Raises
    /// [`AwaitError::NoneSucceeded`] when every task fails or is canceled.
    pub async fn execute_any<T, F>(&self, works: Vec<F>) -> Result<T, AwaitError>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let receipts = self.submit_batch(works)?;
        run_any(&receipts).await
    }

    /// As [`execute_any`](Self::execute_any), raising
    /// [`AwaitError::Timeout`] if no task succeeded within `limit`.
    pub async fn execute_any_within<T, F>(
        &self,
        works: Vec<F>,
        limit: Duration,
    ) -> Result<T, AwaitError>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let receipts = self.submit_batch(works)?;
        match tokio::time::timeout(limit, run_any(&receipts)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                for receipt in &receipts {
                    receipt.cancel();
                }
                Err(AwaitError::Timeout)
            }
        }
    }

    fn submit_batch<T, F>(&self, works: Vec<F>) -> Result<Vec<Receipt<T>>, SubmitError>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let mut receipts = Vec::with_capacity(works.len());
        for work in works {
            match self.submit_inner(Priority::default(), Box::pin(work), None) {
                Ok(receipt) => receipts.push(receipt),
                Err(error) => {
                    for receipt in &receipts {
                        receipt.cancel();
                    }
                    return Err(error);
                }
            }
        }
        Ok(receipts)
    }

    /// Stops accepting new submissions. Queued and running work still runs.
    pub fn shutdown(&self) {
        self.engine.shutdown();
    }

    /// Stops accepting new submissions, interrupts running work, and hands
    /// back the never-started units in submission order. Their receipts stay
    /// `Waiting`; driving a returned unit by hand still runs it.
    pub fn shutdown_now(&self) -> Vec<TaskPin> {
        self.engine.shutdown_now()
    }

    pub fn is_shutdown(&self) -> bool {
        self.engine.is_closed()
    }

    /// True once shut down and every accepted task is terminal.
    pub fn is_terminated(&self) -> bool {
        self.engine.is_terminated()
    }

    /// Suspends until the executor is terminated. Never resolves unless
    /// shutdown is requested.
    pub async fn await_termination(&self) {
        self.engine.terminated().await;
    }

    /// As [`await_termination`](Self::await_termination), waiting at most
    /// `limit`. Returns whether termination was reached.
    pub async fn await_termination_for(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.engine.terminated())
            .await
            .is_ok()
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}

/// Waits for the first success among `receipts`, then cancels the rest.
async fn run_any<T>(receipts: &[Receipt<T>]) -> Result<T, AwaitError>
where
    T: Send + 'static,
{
    let mut pending: FuturesUnordered<_> = receipts
        .iter()
        .map(|receipt| async move { (receipt, receipt.await_done().await) })
        .collect();
    let mut winner = None;
    while let Some((receipt, state)) = pending.next().await {
        if state == TaskState::Succeeded {
            winner = Some(receipt);
            break;
        }
    }
    drop(pending);
    for receipt in receipts {
        receipt.cancel();
    }
    match winner {
        Some(receipt) => receipt.take_value().ok_or(AwaitError::ResultTaken),
        None => Err(AwaitError::NoneSucceeded),
    }
}
