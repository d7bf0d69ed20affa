//! Per-key single-flight guard
//!
//! The first caller for a key runs the initializer; concurrent callers for
//! the same key wait for it and receive a clone of its result. Later
//! callers get the stored result without running anything. Used to make
//! sure at most one creation attempt proceeds per dated table in a run.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Single-flight cells keyed by string
#[derive(Debug)]
pub struct SingleFlight<V> {
    cells: DashMap<String, Arc<OnceCell<V>>>,
}

impl<V> Default for SingleFlight<V> {
    fn default() -> Self {
        SingleFlight {
            cells: DashMap::new(),
        }
    }
}

impl<V: Clone> SingleFlight<V> {
    /// Create an empty guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `init` for `key` unless it already ran or is running
    ///
    /// Returns the stored value and whether this call ran the initializer.
    pub async fn run<F, Fut>(&self, key: &str, init: F) -> (V, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        // Clone the cell out so no map shard lock is held across the await.
        let cell = Arc::clone(&*self.cells.entry(key.to_string()).or_default());
        let mut initiated = false;
        let value = cell
            .get_or_init(|| {
                initiated = true;
                init()
            })
            .await
            .clone();
        (value, initiated)
    }

    /// Stored result for `key`, if the initializer completed
    pub fn get(&self, key: &str) -> Option<V> {
        self.cells.get(key).and_then(|cell| cell.get().cloned())
    }
}
