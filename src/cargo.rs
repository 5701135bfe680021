//! # Batch cargo: bounded-latency coalescing queue.
//!
//! A [`Cargo`] collects items pushed during a batching window and hands them to
//! a flush handler as one ordered group.
//!
//! ```text
//! push(a) ──┐ window opens on first push into an empty cargo
//! push(b) ──┤
//! push(c) ──┘ interval elapses (or max_batch reached)
//!             └─► flush([a, b, c]).await ─► next window
//! ```
//!
//! - Batch membership preserves push order.
//! - Batches are flushed in creation order: the handler is awaited before the
//!   next batch is handed over.
//! - `close().await` flushes what is buffered, then stops.
//! - `abort()` stops now and drops buffered items.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::error::CargoError;

/// Flush policy of a cargo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CargoConfig {
    /// Length of a batching window, measured from its first item.
    pub interval: Duration,
    /// Flush early once a batch holds this many items (`0` = unlimited).
    pub max_batch: usize,
}

impl CargoConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_batch: 0,
        }
    }

    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Returns the size threshold, or `None` when unlimited.
    #[inline]
    pub fn batch_limit(&self) -> Option<usize> {
        (self.max_batch > 0).then_some(self.max_batch)
    }
}

/// Coalescing queue with a background flush worker.
///
/// Must be created inside a Tokio runtime. Dropping a cargo closes its input;
/// the worker still flushes what was buffered, then exits.
pub struct Cargo<T> {
    name: Arc<str>,
    tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
    pending: Arc<watch::Sender<usize>>,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Cargo<T> {
    /// Spawns the flush worker and returns the cargo handle.
    pub fn spawn<F, Fut>(name: impl Into<Arc<str>>, config: CargoConfig, flush: F) -> Self
    where
        F: FnMut(Vec<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);

        let worker = tokio::spawn(run_worker(rx, config, Arc::clone(&pending), flush));

        Self {
            name,
            tx: Mutex::new(Some(tx)),
            pending,
            closed: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Appends an item to the current batch (opening one if needed).
    pub fn push(&self, item: T) -> Result<(), CargoError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CargoError::Closed);
        }
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(CargoError::Closed);
        };
        self.pending.send_modify(|n| *n += 1);
        if tx.send(item).is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            return Err(CargoError::Closed);
        }
        Ok(())
    }
}

impl<T> Cargo<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items pushed but not yet fully flushed.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// True when no pushed item is awaiting or undergoing flush.
    pub fn idle(&self) -> bool {
        self.pending() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Waits until the cargo is idle.
    pub async fn drained(&self) {
        let mut rx = self.pending.subscribe();
        // Err only if the sender is gone, which cannot happen while `self` lives.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stops accepting items, flushes the buffered ones and waits for the worker.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        drop(self.take_sender());
        let Some(worker) = self.take_worker() else {
            return;
        };
        match worker.await {
            Err(e) if e.is_panic() => {
                tracing::error!(cargo = %self.name, "cargo flush handler panicked");
            }
            _ => {}
        }
    }

    /// Stops immediately; buffered items are dropped.
    pub fn abort(&self) {
        self.closed.store(true, Ordering::Release);
        drop(self.take_sender());
        if let Some(worker) = self.take_worker() {
            worker.abort();
        }
        let dropped = self.pending.send_replace(0);
        if dropped > 0 {
            tracing::debug!(cargo = %self.name, dropped, "cargo aborted with pending items");
        }
    }

    fn take_sender(&self) -> Option<mpsc::UnboundedSender<T>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

async fn run_worker<T, F, Fut>(
    mut rx: mpsc::UnboundedReceiver<T>,
    config: CargoConfig,
    pending: Arc<watch::Sender<usize>>,
    mut flush: F,
) where
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(first) = rx.recv().await {
        let deadline = Instant::now() + config.interval;
        let mut batch = vec![first];
        let mut open = true;

        while open && config.batch_limit().is_none_or(|max| batch.len() < max) {
            tokio::select! {
                biased;
                _ = time::sleep_until(deadline) => break,
                next = rx.recv() => match next {
                    Some(item) => batch.push(item),
                    None => open = false,
                },
            }
        }

        let len = batch.len();
        flush(batch).await;
        pending.send_modify(|n| *n = n.saturating_sub(len));

        if !open {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Batches = Arc<Mutex<Vec<Vec<&'static str>>>>;

    fn recording(config: CargoConfig) -> (Cargo<&'static str>, Batches) {
        let batches: Batches = Arc::default();
        let sink = Arc::clone(&batches);
        let cargo = Cargo::spawn("test", config, move |batch| {
            let sink = Arc::clone(&sink);
            async move { sink.lock().unwrap().push(batch) }
        });
        (cargo, batches)
    }

    #[tokio::test]
    async fn one_window_yields_one_ordered_batch() {
        let (cargo, batches) = recording(CargoConfig::new(Duration::from_millis(30)));
        cargo.push("a").unwrap();
        cargo.push("b").unwrap();
        cargo.push("c").unwrap();
        assert_eq!(cargo.pending(), 3);

        cargo.drained().await;
        assert_eq!(*batches.lock().unwrap(), vec![vec!["a", "b", "c"]]);
        assert!(cargo.idle());
    }

    #[tokio::test]
    async fn items_after_window_form_a_new_batch() {
        let (cargo, batches) = recording(CargoConfig::new(Duration::from_millis(20)));
        cargo.push("a").unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        cargo.push("b").unwrap();
        cargo.drained().await;

        assert_eq!(*batches.lock().unwrap(), vec![vec!["a"], vec!["b"]]);
    }

    #[tokio::test]
    async fn size_threshold_flushes_early() {
        let config = CargoConfig::new(Duration::from_millis(40)).with_max_batch(2);
        let (cargo, batches) = recording(config);
        for item in ["a", "b", "c"] {
            cargo.push(item).unwrap();
        }
        cargo.drained().await;

        assert_eq!(*batches.lock().unwrap(), vec![vec!["a", "b"], vec!["c"]]);
    }

    #[tokio::test]
    async fn close_flushes_remaining_then_rejects() {
        let (cargo, batches) = recording(CargoConfig::new(Duration::from_secs(60)));
        cargo.push("late").unwrap();
        cargo.close().await;

        assert_eq!(*batches.lock().unwrap(), vec![vec!["late"]]);
        assert_eq!(cargo.push("after"), Err(CargoError::Closed));
        assert!(cargo.idle());
    }

    #[tokio::test]
    async fn abort_drops_pending_items() {
        let (cargo, batches) = recording(CargoConfig::new(Duration::from_secs(60)));
        cargo.push("lost").unwrap();
        cargo.abort();

        assert!(cargo.idle());
        assert!(cargo.is_closed());
        assert_eq!(cargo.push("x"), Err(CargoError::Closed));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(batches.lock().unwrap().is_empty());
    }
}
