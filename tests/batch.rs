use std::time::Duration;

use futures::future::BoxFuture;
use exequo::{AwaitError, Executor, TaskState};

#[tokio::test]
async fn execute_all_returns_receipts_in_input_order() {
    let executor = Executor::new();
    let works: Vec<_> = (1..=4).map(|i| async move { Ok(i) }).collect();
    let receipts = executor.execute_all(works).await.unwrap();
    assert_eq!(receipts.len(), 4);
    for (i, receipt) in receipts.iter().enumerate() {
        assert!(receipt.is_done());
        assert_eq!(receipt.await_result().await.unwrap(), i as i32 + 1);
    }
}

#[tokio::test]
async fn execute_all_with_an_empty_batch_is_a_noop() {
    let executor = Executor::new();
    let receipts = executor
        .execute_all(Vec::<BoxFuture<'static, anyhow::Result<i32>>>::new())
        .await
        .unwrap();
    assert!(receipts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn execute_all_within_cancels_stragglers_on_timeout() {
    let executor = Executor::new();
    let works: Vec<BoxFuture<'static, anyhow::Result<&str>>> = vec![
        Box::pin(async { Ok("fast") }),
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("slow")
        }),
    ];
    let receipts = executor
        .execute_all_within(works, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(receipts.iter().all(|receipt| receipt.is_done()));
    assert_eq!(receipts[0].state(), TaskState::Succeeded);
    assert_eq!(receipts[1].state(), TaskState::CanceledExecuting);
}

#[tokio::test(start_paused = true)]
async fn execute_any_returns_the_first_success() {
    let executor = Executor::new();
    let works: Vec<BoxFuture<'static, anyhow::Result<i32>>> = vec![
        Box::pin(async { Err(anyhow::anyhow!("first fails")) }),
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(7)
        }),
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(13)
        }),
    ];
    assert_eq!(executor.execute_any(works).await.unwrap(), 7);
}

#[tokio::test]
async fn execute_any_raises_when_nothing_succeeds() {
    let executor = Executor::new();
    let works: Vec<BoxFuture<'static, anyhow::Result<i32>>> = vec![
        Box::pin(async { Err(anyhow::anyhow!("one")) }),
        Box::pin(async { Err(anyhow::anyhow!("two")) }),
    ];
    assert!(matches!(
        executor.execute_any(works).await,
        Err(AwaitError::NoneSucceeded)
    ));
}

#[tokio::test(start_paused = true)]
async fn execute_any_within_raises_timeout() {
    let executor = Executor::new();
    let works: Vec<BoxFuture<'static, anyhow::Result<i32>>> = vec![Box::pin(async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(1)
    })];
    assert!(matches!(
        executor
            .execute_any_within(works, Duration::from_secs(1))
            .await,
        Err(AwaitError::Timeout)
    ));
}

#[tokio::test]
async fn batch_submission_failure_cancels_the_prefix() {
    let executor = Executor::new();
    executor.shutdown();
    let works: Vec<BoxFuture<'static, anyhow::Result<i32>>> =
        vec![Box::pin(async { Ok(1) }), Box::pin(async { Ok(2) })];
    assert!(matches!(
        executor.execute_all(works).await,
        Err(AwaitError::Submit(_))
    ));
}
