//! Scripted fault injection for the in-memory services
//!
//! A script is a list of rules matched by key prefix. Each rule carries a
//! queue of errors consumed one per matching call, and optionally a sticky
//! error returned once the queue is empty.

use parking_lot::Mutex;
use qsbackup_core::RemoteError;
use std::collections::VecDeque;

#[derive(Debug)]
struct Rule {
    prefix: String,
    queued: VecDeque<RemoteError>,
    sticky: Option<RemoteError>,
}

/// Prefix-matched error script
#[derive(Debug, Default)]
pub struct FaultScript {
    rules: Mutex<Vec<Rule>>,
}

impl FaultScript {
    /// Create an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `errors.len()` calls whose key starts with `prefix`
    pub fn push(&self, prefix: &str, errors: impl IntoIterator<Item = RemoteError>) {
        self.rules.lock().push(Rule {
            prefix: prefix.to_string(),
            queued: errors.into_iter().collect(),
            sticky: None,
        });
    }

    /// Fail every call whose key starts with `prefix`
    pub fn always(&self, prefix: &str, error: RemoteError) {
        self.rules.lock().push(Rule {
            prefix: prefix.to_string(),
            queued: VecDeque::new(),
            sticky: Some(error),
        });
    }

    /// Remove every rule
    pub fn clear(&self) {
        self.rules.lock().clear();
    }

    /// Error scripted for the next call with `key`, if any
    pub fn next(&self, key: &str) -> Option<RemoteError> {
        let mut rules = self.rules.lock();
        for rule in rules.iter_mut().filter(|r| key.starts_with(&r.prefix)) {
            if let Some(err) = rule.queued.pop_front() {
                return Some(err);
            }
            if let Some(err) = &rule.sticky {
                return Some(err.clone());
            }
        }
        None
    }

    /// Return `Err` if a fault is scripted for `key`
    pub fn check(&self, key: &str) -> Result<(), RemoteError> {
        match self.next(key) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
