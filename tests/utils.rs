#![allow(dead_code)]

use tokio::sync::watch;

/// Open/closed latch for holding a task at a known point, or for a task to
/// report that it reached one.
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            tx: watch::channel(false).0,
        }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    /// A future that resolves once the gate is opened; usable from inside
    /// submitted work.
    pub fn passed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.wait_for(|open| *open).await;
        }
    }
}
