// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Streaming Primitives
//!
//! Bounded-memory building blocks used by steps that advertise native
//! streaming (`execute_stream`) or async/pooled concurrency
//! (`execute_async`/`execute_pooled`). The executor itself does not route
//! rows through these between DAG nodes — each node still exchanges a full
//! [`pipeline_domain::Dataset`] with its neighbors — these exist for steps
//! that internally fan out across many concurrent units of work (`fetch`
//! across many URLs, `scrape` across many pages).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pipeline_domain::Row;
use tokio::sync::{mpsc, Semaphore};

/// Collects rows into a fixed-size batch, flushed by the caller once full.
pub struct BatchBuffer {
    items: Vec<Row>,
    size: usize,
}

impl BatchBuffer {
    pub fn new(size: usize) -> Self {
        Self {
            items: Vec::new(),
            size: size.max(1),
        }
    }

    pub fn add(&mut self, row: Row) {
        self.items.push(row);
    }

    pub fn add_many(&mut self, rows: impl IntoIterator<Item = Row>) {
        self.items.extend(rows);
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.size
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Drain and return the accumulated rows, resetting the buffer.
    pub fn flush(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.items)
    }
}

/// Bounded async channel between a producer and a consumer. `put` blocks
/// once `capacity` unconsumed items are buffered, bounding memory in a
/// streaming run regardless of producer speed.
pub struct BackpressureChannel {
    tx: tokio::sync::Mutex<Option<mpsc::Sender<Row>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Row>>,
    total_in: AtomicUsize,
    total_out: AtomicUsize,
    capacity: usize,
}

impl BackpressureChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx: tokio::sync::Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            total_in: AtomicUsize::new(0),
            total_out: AtomicUsize::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Blocks if the channel is at capacity. Returns an error if the
    /// channel has already been closed.
    pub async fn put(&self, row: Row) -> Result<(), pipeline_domain::PipelineError> {
        let guard = self.tx.lock().await;
        let tx = guard
            .as_ref()
            .ok_or_else(|| pipeline_domain::PipelineError::Internal("backpressure channel closed".to_string()))?;
        tx.send(row)
            .await
            .map_err(|_| pipeline_domain::PipelineError::Internal("backpressure channel closed".to_string()))?;
        self.total_in.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn put_batch(&self, rows: Vec<Row>) -> Result<(), pipeline_domain::PipelineError> {
        for row in rows {
            self.put(row).await?;
        }
        Ok(())
    }

    /// `None` once the producer side has closed and the buffer has drained.
    pub async fn get(&self) -> Option<Row> {
        let mut rx = self.rx.lock().await;
        let item = rx.recv().await;
        if item.is_some() {
            self.total_out.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Close the producer side. Buffered items remain available to `get()`
    /// until drained, after which `get()` returns `None`.
    pub async fn close(&self) {
        *self.tx.lock().await = None;
    }

    pub fn pending(&self) -> usize {
        self.total_in.load(Ordering::Relaxed) - self.total_out.load(Ordering::Relaxed)
    }

    pub fn total_in(&self) -> usize {
        self.total_in.load(Ordering::Relaxed)
    }

    pub fn total_out(&self) -> usize {
        self.total_out.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A concurrency limiter that widens on sustained success and narrows on
/// elevated error rate, evaluated every `window` completions.
pub struct AdaptiveSemaphore {
    semaphore: Semaphore,
    current: AtomicUsize,
    max: usize,
    window: usize,
    window_errors: AtomicUsize,
    window_count: AtomicUsize,
    lock: tokio::sync::Mutex<()>,
}

/// Error rate within a window above which the limiter shrinks.
const ERROR_RATE_THRESHOLD: f64 = 0.1;

impl AdaptiveSemaphore {
    pub fn new(initial: usize, max_concurrent: usize) -> Arc<Self> {
        let initial = initial.max(1);
        Arc::new(Self {
            semaphore: Semaphore::new(initial),
            current: AtomicUsize::new(initial),
            max: max_concurrent.max(initial),
            window: 20,
            window_errors: AtomicUsize::new(0),
            window_count: AtomicUsize::new(0),
            lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Acquire a permit, holding it until the returned guard is released via
    /// [`AdaptiveSemaphore::release`].
    pub async fn acquire(self: &Arc<Self>) -> tokio::sync::SemaphorePermit<'_> {
        self.semaphore
            .acquire()
            .await
            .expect("AdaptiveSemaphore is never closed")
    }

    /// Report the outcome of one unit of work and, every `window`
    /// completions, re-evaluate the concurrency limit.
    pub async fn release(self: &Arc<Self>, success: bool) {
        if !success {
            self.window_errors.fetch_add(1, Ordering::Relaxed);
        }
        let count = self.window_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count < self.window {
            return;
        }

        let _guard = self.lock.lock().await;
        // Re-check under the lock: another task may have already evaluated
        // and reset the window between our increment and acquiring it.
        let count = self.window_count.swap(0, Ordering::Relaxed);
        if count == 0 {
            return;
        }
        let errors = self.window_errors.swap(0, Ordering::Relaxed);
        let error_rate = errors as f64 / count as f64;

        if error_rate > ERROR_RATE_THRESHOLD {
            let cur = self.current.load(Ordering::Relaxed);
            let shrink_to = (cur / 2).max(1);
            let delta = cur.saturating_sub(shrink_to);
            if delta > 0 {
                self.semaphore.forget_permits(delta);
                self.current.store(shrink_to, Ordering::Relaxed);
            }
        } else if errors == 0 {
            let cur = self.current.load(Ordering::Relaxed);
            if cur < self.max {
                self.semaphore.add_permits(1);
                self.current.store(cur + 1, Ordering::Relaxed);
            }
        }
    }

    pub fn current_limit(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::Value;

    #[test]
    fn batch_buffer_flushes_at_size() {
        let mut buf = BatchBuffer::new(2);
        buf.add(Row::new().with("a", Value::Int(1)));
        assert!(!buf.is_full());
        buf.add(Row::new().with("a", Value::Int(2)));
        assert!(buf.is_full());
        let flushed = buf.flush();
        assert_eq!(flushed.len(), 2);
        assert_eq!(buf.count(), 0);
    }

    #[tokio::test]
    async fn backpressure_channel_round_trips_rows() {
        let chan = BackpressureChannel::new(4);
        chan.put(Row::new().with("a", Value::Int(1))).await.unwrap();
        chan.put(Row::new().with("a", Value::Int(2))).await.unwrap();
        assert_eq!(chan.pending(), 2);
        let first = chan.get().await.unwrap();
        assert_eq!(first.get("a"), Value::Int(1));
        assert_eq!(chan.total_out(), 1);
    }

    #[tokio::test]
    async fn adaptive_semaphore_grows_on_sustained_success() {
        let sem = AdaptiveSemaphore::new(2, 10);
        for _ in 0..20 {
            let permit = sem.acquire().await;
            drop(permit);
            sem.release(true).await;
        }
        assert_eq!(sem.current_limit(), 3);
    }

    #[tokio::test]
    async fn adaptive_semaphore_shrinks_on_elevated_error_rate() {
        let sem = AdaptiveSemaphore::new(8, 10);
        for i in 0..20 {
            let permit = sem.acquire().await;
            drop(permit);
            sem.release(i % 2 == 0).await;
        }
        assert_eq!(sem.current_limit(), 4);
    }
}
