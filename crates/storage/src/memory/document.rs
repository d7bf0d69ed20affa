//! In-memory document store
//!
//! Tables are keyed by their string partition key; writing an item with an
//! existing key replaces it. New tables can be made to report `CREATING`
//! for a number of describes before turning `ACTIVE`.

use crate::memory::faults::FaultScript;
use crate::traits::{DocumentStore, TableSpec, TableStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use qsbackup_core::config::MAX_BATCH_SIZE;
use qsbackup_core::{AttributeValue, Item, RemoteError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug)]
struct Table {
    partition_key: String,
    creating_polls_left: u32,
    items: BTreeMap<String, Item>,
}

/// Document store backed by process memory
///
/// Fault keys are table names.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    tables: DashMap<String, Table>,
    create_calls: DashMap<String, usize>,
    creating_polls: AtomicU32,
    create_latency_ms: AtomicU32,
    unprocessed: Mutex<Vec<(String, usize, u32)>>,
    batch_calls: AtomicUsize,
    /// Faults for `create_table`
    pub create_faults: FaultScript,
    /// Faults for `batch_write`
    pub write_faults: FaultScript,
    /// Faults for `describe_table`
    pub describe_faults: FaultScript,
    /// Faults for `check_access`, keyed by `""`
    pub access_faults: FaultScript,
}

impl MemoryDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// New tables stay `CREATING` for this many describes
    pub fn set_creating_polls(&self, polls: u32) {
        self.creating_polls.store(polls, Ordering::SeqCst);
    }

    /// Delay every `create_table` call
    pub fn set_create_latency(&self, latency: Duration) {
        self.create_latency_ms
            .store(latency.as_millis().min(u32::MAX as u128) as u32, Ordering::SeqCst);
    }

    /// Leave the last `count` items of a batch unprocessed, for the next
    /// `times` batches written to tables starting with `prefix`
    pub fn leave_unprocessed(&self, prefix: &str, count: usize, times: u32) {
        self.unprocessed.lock().push((prefix.to_string(), count, times));
    }

    /// Table names, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Items in a table, ordered by partition key
    pub fn items(&self, table: &str) -> Vec<Item> {
        self.tables
            .get(table)
            .map(|t| t.items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of `create_table` calls that reached a table name
    pub fn create_calls(&self, table: &str) -> usize {
        self.create_calls.get(table).map(|c| *c).unwrap_or(0)
    }

    /// Number of `batch_write` calls
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn take_unprocessed(&self, table: &str) -> usize {
        let mut rules = self.unprocessed.lock();
        for (prefix, count, times) in rules.iter_mut() {
            if *times > 0 && table.starts_with(prefix.as_str()) {
                *times -= 1;
                return *count;
            }
        }
        0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn describe_table(&self, table: &str) -> Result<Option<TableStatus>, RemoteError> {
        self.describe_faults.check(table)?;
        Ok(self.tables.get_mut(table).map(|mut t| {
            if t.creating_polls_left > 0 {
                t.creating_polls_left -= 1;
                TableStatus::Creating
            } else {
                TableStatus::Active
            }
        }))
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<(), RemoteError> {
        *self.create_calls.entry(spec.name.clone()).or_insert(0) += 1;
        let latency = self.create_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(u64::from(latency))).await;
        }
        self.create_faults.check(&spec.name)?;
        match self.tables.entry(spec.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RemoteError::new(
                "ResourceInUseException",
                format!("table already exists: {}", spec.name),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Table {
                    partition_key: spec.partition_key.clone(),
                    creating_polls_left: self.creating_polls.load(Ordering::SeqCst),
                    items: BTreeMap::new(),
                });
                Ok(())
            }
        }
    }

    async fn batch_write(&self, table: &str, items: Vec<Item>) -> Result<Vec<Item>, RemoteError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.write_faults.check(table)?;
        if items.len() > MAX_BATCH_SIZE {
            return Err(RemoteError::new(
                "ValidationException",
                format!("batch of {} exceeds {} items", items.len(), MAX_BATCH_SIZE),
            ));
        }
        let leave = self.take_unprocessed(table).min(items.len());
        let mut t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| RemoteError::new("ResourceNotFoundException", format!("no table {}", table)))?;
        if t.creating_polls_left > 0 {
            return Err(RemoteError::new(
                "ResourceNotFoundException",
                format!("table {} is not active", table),
            ));
        }

        let mut items = items;
        let unprocessed = items.split_off(items.len() - leave);
        for item in items {
            let key = match item.get(&t.partition_key) {
                Some(AttributeValue::S(k)) => k.clone(),
                _ => {
                    return Err(RemoteError::new(
                        "ValidationException",
                        format!("item is missing string key {}", t.partition_key),
                    ))
                }
            };
            t.items.insert(key, item);
        }
        Ok(unprocessed)
    }

    async fn check_access(&self) -> Result<(), RemoteError> {
        self.access_faults.check("")
    }
}
