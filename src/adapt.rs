//! Adaptation between the executor façade and `futures::task::Spawn`, the
//! ecosystem's native engine shape. Inbound: any `Spawn` engine can back an
//! executor. Outbound: every executor is itself a `Spawn` engine, routing
//! through the same task wrapper and lifecycle as façade submissions.

use futures::task::{FutureObj, Spawn, SpawnError};
use tokio::runtime::Handle;

use crate::executor::Executor;

/// [`Spawn`] over a tokio runtime handle.
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Binds to the runtime of the calling context.
    ///
    /// # Panics
    /// Outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Spawn for TokioSpawner {
    fn spawn_obj(&self, future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
        self.handle.spawn(future);
        Ok(())
    }
}

impl Spawn for Executor {
    fn spawn_obj(&self, future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
        self.run(future).map_err(|_| SpawnError::shutdown())
    }

    fn status(&self) -> Result<(), SpawnError> {
        if self.is_shutdown() {
            Err(SpawnError::shutdown())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::SpawnExt;
    use mockall::mock;

    use crate::error::SubmitError;

    mock! {
        Engine {}

        impl Spawn for Engine {
            fn spawn_obj(&self, future: FutureObj<'static, ()>) -> Result<(), SpawnError>;
        }
    }

    #[tokio::test]
    async fn facade_submissions_route_through_the_supplied_engine() {
        let mut engine = MockEngine::new();
        engine
            .expect_spawn_obj()
            .times(2)
            .returning(|_future| Ok(()));
        let executor = Executor::from_spawner(engine, false);

        executor.run(async {}).unwrap();
        let _receipt = executor.submit(async { Ok(1) }).unwrap();

        executor.shutdown();
        assert!(matches!(
            executor.run(async {}),
            Err(SubmitError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn tokio_spawner_backs_an_executor() {
        let executor = Executor::from_spawner(TokioSpawner::current(), false);
        let receipt = executor.submit(async { Ok(2 + 2) }).unwrap();
        assert_eq!(receipt.await_result().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn executor_serves_as_a_spawner() {
        let executor = Executor::new();
        let (tx, mut rx) = tokio::sync::watch::channel(false);
        executor
            .spawn(async move {
                tx.send_replace(true);
            })
            .unwrap();
        rx.wait_for(|ran| *ran).await.unwrap();

        executor.shutdown();
        assert!(executor.status().is_err());
        assert!(executor.spawn(async {}).is_err());
    }
}
