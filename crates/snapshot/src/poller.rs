//! Periodic snapshot polling
//!
//! A poller fetches once immediately and then on every interval tick. A
//! successful fetch replaces the published snapshot wholesale; a failed one
//! keeps the previous snapshot.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use nexus_core::UpstreamResult;

#[derive(Debug, Default)]
struct Counters {
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Poll statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    pub successes: u64,
    pub failures: u64,
}

/// Background poller publishing `Arc<T>` snapshots.
///
/// Dropping the poller cancels its timer and any request in flight.
pub struct Poller<T> {
    name: &'static str,
    snapshot: watch::Receiver<Arc<T>>,
    counters: Arc<Counters>,
    task: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> Poller<T> {
    /// Start polling. `initial` is published until the first success.
    pub fn spawn<F, Fut>(name: &'static str, interval: Duration, initial: T, mut fetch: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = UpstreamResult<T>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(Arc::new(initial));
        let counters = Arc::new(Counters::default());
        let task_counters = Arc::clone(&counters);

        let task = tokio::spawn(async move {
            info!("Polling {} every {:?}", name, interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match fetch().await {
                    Ok(value) => {
                        task_counters.successes.fetch_add(1, Ordering::Relaxed);
                        tx.send_replace(Arc::new(value));
                        debug!("{} snapshot refreshed", name);
                    }
                    Err(e) => {
                        task_counters.failures.fetch_add(1, Ordering::Relaxed);
                        warn!("{} poll failed, keeping previous snapshot: {}", name, e);
                    }
                }
            }
        });

        Self {
            name,
            snapshot: rx,
            counters,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<T> {
        Arc::clone(&self.snapshot.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.snapshot.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }

    pub fn stats(&self) -> PollStats {
        PollStats {
            successes: self.counters.successes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

impl<T> Poller<T> {
    /// Cancel the timer and any request in flight. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Stopping {} poller", self.name);
            task.abort();
        }
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
