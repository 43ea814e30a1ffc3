use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering::SeqCst};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::task::{FutureObj, Spawn};
use tokio::sync::{Notify, watch};
use tracing::{debug, trace, warn};

use crate::TaskPin;
use crate::error::SubmitError;
use crate::priority::Priority;
use crate::task::{CellProbe, signalled};

/// One queued unit of work. Ordered by priority, then submission order.
pub(crate) struct Submission {
    seq: u64,
    priority: Priority,
    run: TaskPin,
}

impl PartialEq for Submission {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Submission {}

impl PartialOrd for Submission {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Submission {
    fn cmp(&self, other: &Self) -> Ordering {
        // max-heap: higher priority first, then earlier submission
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub(crate) struct PoolConfig {
    pub(crate) core: usize,
    pub(crate) max: usize,
    pub(crate) queue_capacity: Option<usize>,
}

struct PoolBackend {
    queue: Mutex<BinaryHeap<Submission>>,
    work_ready: Notify,
    queue_capacity: Option<usize>,
    max: usize,
    /// Workers alive, resident and transient.
    live: AtomicUsize,
    /// Workers parked on the queue.
    idle: AtomicUsize,
}

enum Backend {
    Pool(PoolBackend),
    Spawner(Box<dyn Spawn + Send + Sync>),
}

struct Shared {
    backend: Backend,
    scheduling: bool,
    seq: AtomicU64,
    /// Tasks currently running on a worker (or handed to the spawner).
    busy: AtomicUsize,
    closed: watch::Sender<bool>,
    interrupt: watch::Sender<bool>,
    terminated: watch::Sender<bool>,
}

impl Shared {
    fn new(backend: Backend, scheduling: bool) -> Self {
        Self {
            backend,
            scheduling,
            seq: AtomicU64::new(0),
            busy: AtomicUsize::new(0),
            closed: watch::channel(false).0,
            interrupt: watch::channel(false).0,
            terminated: watch::channel(false).0,
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn queued(&self) -> usize {
        match &self.backend {
            Backend::Pool(pool) => pool.queue.lock().expect("task queue poisoned").len(),
            Backend::Spawner(_) => 0,
        }
    }

    /// Flips the terminated flag once shut down with no queued or busy work.
    /// The queue lock is taken before the busy read: a worker increments busy
    /// under the lock when it pops, so an in-flight pickup is never missed.
    fn maybe_terminated(&self) {
        if self.is_closed() && self.queued() == 0 && self.busy.load(SeqCst) == 0 {
            self.terminated.send_replace(true);
        }
    }

    /// Enqueues bypassing the capacity check, unless the engine has closed.
    /// The closed re-check happens under the queue lock so a submission never
    /// lands behind a shutdown drain.
    fn enqueue_fired(self: &Arc<Self>, sub: Submission) -> bool {
        let Backend::Pool(pool) = &self.backend else {
            return false;
        };
        {
            let mut queue = pool.queue.lock().expect("task queue poisoned");
            if *self.closed.borrow() {
                return false;
            }
            queue.push(sub);
        }
        pool.work_ready.notify_one();
        self.maybe_grow();
        true
    }

    /// Spawns a transient worker when no worker is idle and the pool has
    /// headroom.
    fn maybe_grow(self: &Arc<Self>) {
        let Backend::Pool(pool) = &self.backend else {
            return;
        };
        if pool.idle.load(SeqCst) > 0 {
            return;
        }
        let grew = pool
            .live
            .fetch_update(SeqCst, SeqCst, |live| {
                (live < pool.max).then_some(live + 1)
            })
            .is_ok();
        if grew {
            tokio::spawn(worker(self.clone(), false));
        }
    }
}

/// The underlying execution engine: either an owned worker pool or a
/// caller-supplied spawner. Cheap to clone; one executor owns exactly one.
#[derive(Clone)]
pub(crate) struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    pub(crate) fn pool(config: PoolConfig, scheduling: bool) -> Self {
        let shared = Arc::new(Shared::new(
            Backend::Pool(PoolBackend {
                queue: Mutex::new(BinaryHeap::new()),
                work_ready: Notify::new(),
                queue_capacity: config.queue_capacity,
                max: config.max.max(1),
                live: AtomicUsize::new(config.core),
                idle: AtomicUsize::new(0),
            }),
            scheduling,
        ));
        for _ in 0..config.core {
            tokio::spawn(worker(shared.clone(), true));
        }
        Self { shared }
    }

    pub(crate) fn spawner<S>(spawner: S, scheduling: bool) -> Self
    where
        S: Spawn + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared::new(Backend::Spawner(Box::new(spawner)), scheduling)),
        }
    }

    pub(crate) fn submission(&self, priority: Priority, run: TaskPin) -> Submission {
        Submission {
            seq: self.shared.seq.fetch_add(1, SeqCst),
            priority,
            run,
        }
    }

    pub(crate) fn supports_scheduling(&self) -> bool {
        self.shared.scheduling
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub(crate) fn interrupt_signal(&self) -> watch::Receiver<bool> {
        self.shared.interrupt.subscribe()
    }

    /// Accepts a submission or rejects it synchronously; never blocks.
    pub(crate) fn dispatch(&self, sub: Submission) -> Result<(), SubmitError> {
        if self.is_closed() {
            return Err(SubmitError::ShutDown);
        }
        match &self.shared.backend {
            Backend::Pool(pool) => {
                {
                    let mut queue = pool.queue.lock().expect("task queue poisoned");
                    // re-check under the lock so a push never races a
                    // shutdown drain
                    if self.is_closed() {
                        return Err(SubmitError::ShutDown);
                    }
                    if let Some(capacity) = pool.queue_capacity {
                        if queue.len() >= capacity {
                            warn!(capacity, "task queue full, rejecting submission");
                            return Err(SubmitError::QueueFull);
                        }
                    }
                    trace!(seq = sub.seq, "task queued");
                    queue.push(sub);
                }
                pool.work_ready.notify_one();
                self.shared.maybe_grow();
                Ok(())
            }
            Backend::Spawner(_) => self.spawn_out(sub.run),
        }
    }

    /// Hands the submission to the engine once `delay` has elapsed. The fire
    /// is skipped for tasks canceled in the meantime and aborted to canceled
    /// if the engine closed before the fire instant. Queue capacity applies
    /// to callers, not to timers firing late.
    pub(crate) fn dispatch_after(
        &self,
        sub: Submission,
        delay: Duration,
        probe: Arc<dyn CellProbe>,
    ) -> Result<(), SubmitError> {
        if self.is_closed() {
            return Err(SubmitError::ShutDown);
        }
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if probe.probe_state().is_terminal() {
                return;
            }
            match &engine.shared.backend {
                Backend::Pool(_) => {
                    if !engine.shared.enqueue_fired(sub) {
                        probe.abort();
                    }
                }
                Backend::Spawner(_) => {
                    if engine.is_closed() || engine.spawn_out(sub.run).is_err() {
                        probe.abort();
                    }
                }
            }
        });
        Ok(())
    }

    fn spawn_out(&self, run: TaskPin) -> Result<(), SubmitError> {
        let Backend::Spawner(spawner) = &self.shared.backend else {
            unreachable!("spawn_out called on a pool engine");
        };
        self.shared.busy.fetch_add(1, SeqCst);
        // re-check after raising busy so a concurrent shutdown either sees
        // the submission as in flight or we back out here
        if self.is_closed() {
            self.shared.busy.fetch_sub(1, SeqCst);
            return Err(SubmitError::ShutDown);
        }
        let shared = self.shared.clone();
        let wrapped: TaskPin = Box::pin(async move {
            run.await;
            shared.busy.fetch_sub(1, SeqCst);
            shared.maybe_terminated();
        });
        match spawner.spawn_obj(FutureObj::from(wrapped)) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.shared.busy.fetch_sub(1, SeqCst);
                Err(SubmitError::ShutDown)
            }
        }
    }

    /// Stops accepting new work. Queued work still runs.
    pub(crate) fn shutdown(&self) {
        if self.shared.closed.send_replace(true) {
            return;
        }
        debug!("engine shutting down");
        self.shared.maybe_terminated();
    }

    /// Shuts down, drains the queue, and broadcasts an interrupt to running
    /// work. Returns the never-started units in submission order; their
    /// receipts stay live and the units still run if driven by hand.
    pub(crate) fn shutdown_now(&self) -> Vec<TaskPin> {
        self.shutdown();
        let drained = match &self.shared.backend {
            Backend::Pool(pool) => {
                let mut queue = pool.queue.lock().expect("task queue poisoned");
                let mut subs = std::mem::take(&mut *queue).into_vec();
                subs.sort_by_key(|sub| sub.seq);
                subs.into_iter().map(|sub| sub.run).collect()
            }
            Backend::Spawner(_) => Vec::new(),
        };
        debug!(drained = drained.len(), "engine interrupted");
        self.shared.interrupt.send_replace(true);
        self.shared.maybe_terminated();
        drained
    }

    pub(crate) fn is_terminated(&self) -> bool {
        *self.shared.terminated.borrow()
    }

    /// Suspends until shut down and all accepted work is terminal.
    pub(crate) async fn terminated(&self) {
        let mut rx = self.shared.terminated.subscribe();
        let _ = rx.wait_for(|terminated| *terminated).await;
    }
}

/// Worker loop: drain the queue one submission at a time; park when empty.
/// Resident workers live until shutdown, transient workers exit when idle.
async fn worker(shared: Arc<Shared>, resident: bool) {
    let Backend::Pool(pool) = &shared.backend else {
        return;
    };
    let mut closed = shared.closed.subscribe();
    loop {
        // register for wakeups before checking the queue
        let notified = pool.work_ready.notified();
        let next = {
            let mut queue = pool.queue.lock().expect("task queue poisoned");
            let sub = queue.pop();
            // busy goes up under the lock so termination checks never see
            // the gap between pop and pickup
            if sub.is_some() {
                shared.busy.fetch_add(1, SeqCst);
            }
            sub
        };
        if let Some(sub) = next {
            trace!(seq = sub.seq, "task picked up");
            sub.run.await;
            shared.busy.fetch_sub(1, SeqCst);
            shared.maybe_terminated();
            continue;
        }
        if shared.is_closed() {
            break;
        }
        if resident {
            pool.idle.fetch_add(1, SeqCst);
            tokio::select! {
                _ = notified => {}
                _ = signalled(&mut closed) => {}
            }
            pool.idle.fetch_sub(1, SeqCst);
            continue;
        }
        // transient: release the slot, then re-check for a submission that
        // raced the exit
        pool.live.fetch_sub(1, SeqCst);
        let raced = !pool.queue.lock().expect("task queue poisoned").is_empty()
            && pool
                .live
                .fetch_update(SeqCst, SeqCst, |live| {
                    (live < pool.max).then_some(live + 1)
                })
                .is_ok();
        if raced {
            continue;
        }
        shared.maybe_terminated();
        return;
    }
    pool.live.fetch_sub(1, SeqCst);
    shared.maybe_terminated();
}
