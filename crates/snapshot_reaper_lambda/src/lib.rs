//! AWS-oriented adapters and handlers for the orphaned-snapshot sweep.
//!
//! This crate owns runtime integration details (the Lambda entry point and
//! the EC2 adapter seams). Classification rules and contracts live in
//! `snapshot_reaper_core`.

pub mod adapters;
pub mod handlers;
