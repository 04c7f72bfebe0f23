//! Batched last-seen tracking.
//!
//! Devices report in constantly; writing a timestamp per report would turn
//! every Idle poll into a write. The batcher collects enrollment ids and hands
//! them to a flush function when the batch fills up or the interval elapses.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

type FlushFn = dyn Fn(Vec<String>) + Send + Sync;

struct Inner {
    // Ordered so every flush touches rows in the same order.
    pending: Mutex<BTreeSet<String>>,
    capacity: usize,
    flush: Box<FlushFn>,
}

impl Inner {
    fn take_pending(&self) -> Vec<String> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *pending).into_iter().collect()
    }

    fn flush_pending(&self) {
        let ids = self.take_pending();
        if ids.is_empty() {
            return;
        }
        tracing::trace!(count = ids.len(), "flushing last-seen batch");
        (self.flush)(ids);
    }
}

/// Collects enrollment ids and flushes them in batches.
///
/// Dropping the batcher stops the timer task without a final flush; call
/// [`LastSeenBatcher::flush`] first to persist pending ids.
pub struct LastSeenBatcher {
    inner: Arc<Inner>,
    task: tokio::task::JoinHandle<()>,
}

impl LastSeenBatcher {
    /// Start a batcher on the current tokio runtime.
    ///
    /// `flush` receives each batch sorted and deduplicated. It runs inline
    /// when a write fills the batch to `capacity`, and on the blocking pool
    /// when the interval elapses with ids pending.
    pub fn spawn<F>(interval: Duration, capacity: usize, flush: F) -> Self
    where
        F: Fn(Vec<String>) + Send + Sync + 'static,
    {
        let inner = Arc::new(Inner {
            pending: Mutex::new(BTreeSet::new()),
            capacity: capacity.max(1),
            flush: Box::new(flush),
        });

        let timer_inner = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let inner = Arc::clone(&timer_inner);
                if let Err(e) = tokio::task::spawn_blocking(move || inner.flush_pending()).await {
                    tracing::error!(error = %e, "last-seen flush task failed");
                }
            }
        });

        Self { inner, task }
    }

    /// Record that `id` was seen.
    pub fn mark_seen(&self, id: &str) {
        let batch = {
            let mut pending = self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            pending.insert(id.to_string());
            if pending.len() >= self.inner.capacity {
                Some(std::mem::take(&mut *pending))
            } else {
                None
            }
        };

        if let Some(batch) = batch {
            (self.inner.flush)(batch.into_iter().collect());
        }
    }

    /// Flush pending ids now.
    pub fn flush(&self) {
        self.inner.flush_pending();
    }

    /// Number of ids waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for LastSeenBatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
