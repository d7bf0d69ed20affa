//! Bounded worker pool
//!
//! Units are spawned eagerly onto the runtime but each waits for a
//! semaphore permit before doing any work, so at most `workers` units make
//! remote calls at once. Completion order is unconstrained.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// A pool running at most `workers` units concurrently
pub struct WorkerPool<T> {
    permits: Arc<Semaphore>,
    workers: usize,
    tasks: JoinSet<T>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool; `workers` is clamped to at least 1
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        WorkerPool {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            tasks: JoinSet::new(),
        }
    }

    /// Configured concurrency
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Units spawned and not yet joined
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no units are pending
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Queue a unit
    pub fn spawn<F>(&mut self, unit: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tasks.spawn(async move {
            // The semaphore is never closed, so acquisition only waits.
            let _permit = permits.acquire_owned().await.ok();
            unit.await
        });
    }

    /// Wait for the next unit to finish
    ///
    /// Returns `None` once every unit has been joined. A unit that panicked
    /// is logged and skipped.
    pub async fn join_next(&mut self) -> Option<T> {
        loop {
            match self.tasks.join_next().await? {
                Ok(value) => return Some(value),
                Err(e) => error!(error = %e, "worker unit did not complete"),
            }
        }
    }

    /// Wait for every unit and collect their outputs
    pub async fn join_all(mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.tasks.len());
        while let Some(value) = self.join_next().await {
            out.push(value);
        }
        out
    }
}
