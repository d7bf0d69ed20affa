//! Engine Integration Tests
//!
//! End-to-end runs of qsbackup-engine against the in-memory services.

#[path = "../common/mod.rs"]
mod common;

mod cancellation;
mod failures;
mod full_run;
mod manifest;
