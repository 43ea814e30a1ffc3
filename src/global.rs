//! Free-function convenience over lazily built process-wide executors.
//!
//! Both defaults are worker-per-task flavored; the scheduling pair runs on a
//! separate scheduler-capable instance. The defaults are never shut down.

use std::sync::OnceLock;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::SubmitError;
use crate::executor::Executor;
use crate::receipt::Receipt;

fn default_executor() -> &'static Executor {
    static EXECUTOR: OnceLock<Executor> = OnceLock::new();
    EXECUTOR.get_or_init(Executor::new)
}

fn default_scheduler() -> &'static Executor {
    static SCHEDULER: OnceLock<Executor> = OnceLock::new();
    SCHEDULER.get_or_init(Executor::new_scheduler)
}

/// Fire-and-forget on the default executor.
pub fn run<F>(work: F) -> Result<(), SubmitError>
where
    F: Future<Output = ()> + Send + 'static,
{
    default_executor().run(work)
}

/// Submits value-bearing work on the default executor.
pub fn submit<T, F>(work: F) -> Result<Receipt<T>, SubmitError>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    default_executor().submit(work)
}

/// Delayed submission on the default scheduler.
pub fn schedule<T, F>(work: F, delay: Duration) -> Result<Receipt<T>, SubmitError>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    default_scheduler().schedule(work, delay)
}

/// Fixed-instant submission on the default scheduler.
pub fn schedule_at<T, F>(work: F, at: Instant) -> Result<Receipt<T>, SubmitError>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    default_scheduler().schedule_at(work, at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_accept_and_run_work() {
        let receipt = submit(async { Ok(21 * 2) }).unwrap();
        assert_eq!(receipt.await_result().await.unwrap(), 42);

        let scheduled = schedule(async { Ok("later") }, Duration::from_millis(5)).unwrap();
        assert_eq!(scheduled.await_result().await.unwrap(), "later");
    }
}
