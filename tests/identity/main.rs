//! Identity Backup Integration Tests
//!
//! Users, groups and memberships written to dated document-store tables.

#[path = "../common/mod.rs"]
mod common;

mod tables;
mod writes;
