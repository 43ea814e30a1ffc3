//! Task execution and receipt framework.
//!
//! One-shot submission, delayed/periodic scheduling, batch execution, and
//! priority- and fork/join-style execution behind a single façade. Every
//! submitted unit of work is wrapped in a task with a race-free lifecycle
//! ([`TaskState`]), observed and controlled through a [`Receipt`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use exequo::Executor;
//!
//! let executor = Executor::new();
//! let receipt = executor.submit(async { Ok(2 + 2) })?;
//! assert_eq!(receipt.await_result().await?, 4);
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;

mod adapt;
mod engine;
mod error;
mod executor;
mod forkjoin;
pub mod global;
mod priority;
mod receipt;
mod scheduling;
mod state;
mod task;

pub use adapt::TokioSpawner;
pub use error::{AwaitError, SubmitError, TaskError};
pub use executor::Executor;
pub use forkjoin::ForkJoinExecutor;
pub use priority::{Priority, PriorityExecutor};
pub use receipt::{Receipt, VoidReceipt};
pub use state::TaskState;

type TaskBox = Box<dyn Future<Output = ()> + Send + 'static>;

/// An erased, ready-to-run unit of work, as handed to execution engines.
pub type TaskPin = Pin<TaskBox>;
