mod utils;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use exequo::{AwaitError, Executor, TaskState};
use utils::Gate;

#[tokio::test]
async fn cancel_before_start_skips_execution() {
    let executor = Executor::with_pool(1, 1, None);
    let started = Gate::new();
    let hold = Gate::new();
    let occupied = started.passed();
    let held = hold.passed();
    executor
        .run(async move {
            started.open();
            held.await;
        })
        .unwrap();
    occupied.await;

    let ran = Arc::new(AtomicBool::new(false));
    let queued = {
        let ran = ran.clone();
        executor
            .submit(async move {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap()
    };
    assert!(queued.cancel());
    assert_eq!(queued.state(), TaskState::Canceled);

    hold.open();
    assert_eq!(queued.await_done().await, TaskState::Canceled);
    assert!(matches!(
        queued.await_result().await,
        Err(AwaitError::Canceled)
    ));
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancel_interrupts_executing_work() {
    let executor = Executor::new();
    let started = Gate::new();
    let hold = Gate::new();
    let reached = started.passed();
    let held = hold.passed();
    let receipt = executor
        .submit(async move {
            started.open();
            held.await;
            Ok(1)
        })
        .unwrap();
    reached.await;

    assert!(receipt.cancel());
    assert_eq!(receipt.state(), TaskState::CanceledExecuting);
    assert!(matches!(
        receipt.await_result().await,
        Err(AwaitError::CanceledExecuting)
    ));
}

#[tokio::test]
async fn soft_cancel_lets_executing_work_finish() {
    let executor = Executor::new();
    let started = Gate::new();
    let hold = Gate::new();
    let reached = started.passed();
    let held = hold.passed();
    let receipt = executor
        .submit(async move {
            started.open();
            held.await;
            Ok(5)
        })
        .unwrap();
    reached.await;

    assert!(!receipt.cancel_with(false));
    assert_eq!(receipt.state(), TaskState::Executing);

    hold.open();
    assert_eq!(receipt.await_result().await.unwrap(), 5);
}

#[tokio::test]
async fn cancel_after_terminal_is_a_noop() {
    let executor = Executor::new();
    let receipt = executor.submit(async { Ok(3) }).unwrap();
    assert_eq!(receipt.await_done().await, TaskState::Succeeded);
    assert!(!receipt.cancel());
    assert_eq!(receipt.state(), TaskState::Succeeded);
    assert_eq!(receipt.await_result().await.unwrap(), 3);
}

#[tokio::test(start_paused = true)]
async fn timed_wait_does_not_cancel_the_task() {
    let executor = Executor::new();
    let started = Gate::new();
    let hold = Gate::new();
    let reached = started.passed();
    let held = hold.passed();
    let receipt = executor
        .submit(async move {
            started.open();
            held.await;
            Ok("done")
        })
        .unwrap();
    reached.await;

    assert!(matches!(
        receipt.await_result_for(Duration::from_millis(10)).await,
        Err(AwaitError::Timeout)
    ));
    assert_eq!(receipt.state(), TaskState::Executing);

    hold.open();
    assert_eq!(receipt.await_result().await.unwrap(), "done");
}
