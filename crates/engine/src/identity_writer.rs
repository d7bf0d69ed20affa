//! Identity backup writer
//!
//! Writes one identity category (users, groups or memberships) into its
//! dated table:
//!
//! 1. Ensure the table exists. Creation runs at most once per table name
//!    per run; a table that already exists, or appears between the describe
//!    and the create, is used as is.
//! 2. Wait until the table reports `ACTIVE`.
//! 3. Write items in batches. Items a batch leaves unprocessed are retried
//!    on their own with backoff; whatever is still unwritten when the
//!    attempt budget runs out is recorded per record key.
//!
//! A table that cannot be created fails this category only.

use crate::outcome::{ErrorEntry, IdentityOutcome};
use qsbackup_concurrency::{
    check, retry_transient, sleep_or_cancel, with_timeout, CancellationToken, RetryError,
    RetryPolicy, SingleFlight,
};
use qsbackup_core::config::{TimeoutConfig, MAX_BATCH_SIZE};
use qsbackup_core::{Category, ErrorKind, IdentityTableRef, Item};
use qsbackup_storage::{DocumentStore, TableSpec, TableStatus};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Per-run guard over dated table creation; the value records whether this
/// run created the table
pub type TableGuard = SingleFlight<Result<bool, RetryError>>;

/// Outcome of one batch; `abandoned` items were pending when the run was
/// cancelled and count as neither written nor failed
struct BatchResult {
    written: usize,
    errors: Vec<ErrorEntry>,
    abandoned: usize,
}

enum Halt {
    Failed(String),
    Cancelled,
}

/// Writes identity records into dated tables
pub struct IdentityWriter<'a> {
    store: &'a dyn DocumentStore,
    guard: &'a TableGuard,
    timeouts: &'a TimeoutConfig,
    policy: &'a RetryPolicy,
    batch_size: usize,
    token: &'a CancellationToken,
}

impl<'a> IdentityWriter<'a> {
    /// Create a writer; `batch_size` is clamped to `1..=25`
    pub fn new(
        store: &'a dyn DocumentStore,
        guard: &'a TableGuard,
        timeouts: &'a TimeoutConfig,
        policy: &'a RetryPolicy,
        batch_size: usize,
        token: &'a CancellationToken,
    ) -> Self {
        IdentityWriter {
            store,
            guard,
            timeouts,
            policy,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            token,
        }
    }

    /// Back up `items` into `table`
    ///
    /// Returns `None` when the run was cancelled before any record was
    /// attempted. Sets `table.created_this_run` when this call created the
    /// table.
    pub async fn write(&self, table: &mut IdentityTableRef, items: Vec<Item>) -> Option<IdentityOutcome> {
        let total = items.len();
        let mut outcome = IdentityOutcome {
            category: Category::from(table.table),
            table: table.dated_name.clone(),
            attempted: 0,
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
        };

        match self.ensure_table(table).await {
            Ok(created) => table.created_this_run = created,
            Err(RetryError::Cancelled) => return None,
            Err(RetryError::Failed { error, attempts }) => {
                let message = format!("table could not be created after {} attempt(s): {}", attempts, error);
                return Some(creation_failed(outcome, total, message));
            }
        }

        match self.wait_active(&table.dated_name).await {
            Ok(()) => {}
            Err(Halt::Cancelled) => return None,
            Err(Halt::Failed(message)) => return Some(creation_failed(outcome, total, message)),
        }

        let partition_key = table.table.partition_key();
        let mut remaining = items.into_iter();
        loop {
            let batch: Vec<Item> = remaining.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }
            if check(self.token).is_err() {
                info!(table = %table.dated_name, written = outcome.succeeded, "identity write cancelled");
                break;
            }
            let size = batch.len();
            let result = self.write_batch(&table.dated_name, partition_key, batch).await;
            outcome.attempted += size - result.abandoned;
            outcome.succeeded += result.written;
            outcome.failed += result.errors.len();
            outcome.errors.extend(result.errors);
            if result.abandoned > 0 {
                info!(
                    table = %table.dated_name,
                    written = outcome.succeeded,
                    abandoned = result.abandoned,
                    "identity write cancelled during retry"
                );
                break;
            }
        }

        if outcome.attempted == 0 && total > 0 {
            return None;
        }
        info!(
            table = %table.dated_name,
            created = table.created_this_run,
            written = outcome.succeeded,
            failed = outcome.failed,
            "identity category written"
        );
        Some(outcome)
    }

    async fn ensure_table(&self, table: &IdentityTableRef) -> Result<bool, RetryError> {
        let spec = TableSpec {
            name: table.dated_name.clone(),
            partition_key: table.table.partition_key().to_string(),
        };
        let (result, initiated) = self
            .guard
            .run(&table.dated_name, || self.create_if_missing(&spec))
            .await;
        // Writers that waited on another's creation did not create the table
        result.map(|created| created && initiated)
    }

    async fn create_if_missing(&self, spec: &TableSpec) -> Result<bool, RetryError> {
        let store = self.store;
        let call_timeout = self.timeouts.call_timeout;

        let existing = retry_transient(self.policy, self.token, "describe_table", move |_| {
            with_timeout(call_timeout, "describe_table", store.describe_table(&spec.name))
        })
        .await?;
        if existing.is_some() {
            debug!(table = %spec.name, "table already present");
            return Ok(false);
        }

        let created = retry_transient(self.policy, self.token, "create_table", move |_| async move {
            match with_timeout(call_timeout, "create_table", store.create_table(spec)).await {
                Ok(()) => Ok(true),
                Err(e) if e.is_already_exists() => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await?;
        if created {
            info!(table = %spec.name, key = %spec.partition_key, "table created");
        } else {
            debug!(table = %spec.name, "table created concurrently elsewhere");
        }
        Ok(created)
    }

    async fn wait_active(&self, name: &str) -> Result<(), Halt> {
        let deadline = Instant::now() + self.timeouts.table_ready_timeout;
        loop {
            match with_timeout(self.timeouts.call_timeout, "describe_table", self.store.describe_table(name)).await {
                Ok(Some(TableStatus::Active)) => return Ok(()),
                Ok(status) => debug!(table = name, ?status, "waiting for table"),
                Err(e) if e.is_retryable() => debug!(table = name, error = %e, "table status unavailable"),
                Err(e) => return Err(Halt::Failed(format!("table status check failed: {}", e))),
            }
            if Instant::now() >= deadline {
                return Err(Halt::Failed(format!(
                    "table did not become active within {}s",
                    self.timeouts.table_ready_timeout.as_secs_f64()
                )));
            }
            sleep_or_cancel(self.timeouts.table_poll_interval, self.token)
                .await
                .map_err(|_| Halt::Cancelled)?;
        }
    }

    async fn write_batch(&self, table: &str, partition_key: &str, batch: Vec<Item>) -> BatchResult {
        let total = batch.len();
        let mut pending = batch;
        let mut attempt = 1;
        loop {
            let (cause, retryable) = match with_timeout(
                self.timeouts.call_timeout,
                "batch_write",
                self.store.batch_write(table, pending.clone()),
            )
            .await
            {
                Ok(unprocessed) if unprocessed.is_empty() => {
                    return BatchResult {
                        written: total,
                        errors: Vec::new(),
                        abandoned: 0,
                    }
                }
                Ok(unprocessed) => {
                    let cause = format!("{} item(s) left unprocessed", unprocessed.len());
                    pending = unprocessed;
                    (cause, true)
                }
                Err(e) => (e.to_string(), e.is_retryable()),
            };

            if !retryable || !self.policy.allows_another(attempt) {
                error!(table, attempt, unwritten = pending.len(), cause = %cause, "identity records not written");
                let message = format!("not written after {} attempt(s): {}", attempt, cause);
                return BatchResult {
                    written: total - pending.len(),
                    errors: unwritten(partition_key, &pending, &message),
                    abandoned: 0,
                };
            }

            let delay = self.policy.delay(attempt);
            warn!(
                table,
                attempt,
                pending = pending.len(),
                delay_ms = delay.as_millis() as u64,
                "batch incomplete, retrying"
            );
            if sleep_or_cancel(delay, self.token).await.is_err() {
                return BatchResult {
                    written: total - pending.len(),
                    errors: Vec::new(),
                    abandoned: pending.len(),
                };
            }
            attempt += 1;
        }
    }
}

fn creation_failed(mut outcome: IdentityOutcome, total: usize, message: String) -> IdentityOutcome {
    error!(table = %outcome.table, error = %message, "identity table unavailable");
    outcome.attempted = total;
    outcome.failed = total;
    outcome.errors.push(ErrorEntry::new(
        outcome.table.clone(),
        ErrorKind::TableCreationFailed,
        message,
    ));
    outcome
}

fn unwritten(partition_key: &str, items: &[Item], message: &str) -> Vec<ErrorEntry> {
    items
        .iter()
        .map(|item| {
            let key = item
                .get(partition_key)
                .and_then(|v| v.as_str())
                .unwrap_or("<unknown>");
            ErrorEntry::new(key, ErrorKind::WriteFailed, message)
        })
        .collect()
}
