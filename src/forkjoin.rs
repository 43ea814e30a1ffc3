use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::error::AwaitError;
use crate::receipt::Receipt;
use crate::task::{TaskCell, drive};

/// Executor for recursive decomposition over a work-stealing engine: the
/// ambient tokio multi-thread runtime.
///
/// `fork` spawns a subtask, joining is the receipt's `await_result`. A
/// joining worker suspends instead of blocking its thread, so recursive
/// splits never exhaust the pool and no worker is spawned per level. Cloning
/// is cheap; clones fork onto the same runtime.
#[derive(Clone)]
pub struct ForkJoinExecutor {
    handle: Handle,
    interrupt: Arc<watch::Sender<bool>>,
}

impl ForkJoinExecutor {
    /// Binds to the runtime of the calling context.
    ///
    /// # Panics
    /// Outside a tokio runtime.
    pub fn new() -> Self {
        Self::from_handle(Handle::current())
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            interrupt: Arc::new(watch::channel(false).0),
        }
    }

    /// Spawns a subtask and returns its receipt without waiting.
    pub fn fork<T, F>(&self, work: F) -> Receipt<T>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let cell = Arc::new(TaskCell::new(None));
        let run = drive(cell.clone(), Box::pin(work), self.interrupt.subscribe());
        self.handle.spawn(run);
        Receipt::new(cell)
    }

    /// Runs a root task to completion: fork, then join.
    pub async fn invoke<T, F>(&self, work: F) -> Result<T, AwaitError>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.fork(work).await_result().await
    }

    /// Drops every forked subtask still in flight at its next suspension
    /// point; their receipts end `Canceled` or `CanceledExecuting`.
    pub fn interrupt_all(&self) {
        self.interrupt.send_replace(true);
    }
}

impl Default for ForkJoinExecutor {
    fn default() -> Self {
        Self::new()
    }
}
