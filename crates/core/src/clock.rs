//! Wall-clock abstraction
//!
//! Run dates, key timestamps and `backup_timestamp` attributes all read the
//! time through [`Clock`] so tests can pin it.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Source of the current UTC time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// The system clock as a shared handle
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
