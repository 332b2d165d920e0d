//! Shared snapshot-reaper domain primitives.
//!
//! This crate owns the orphan-classification rules and the record/response
//! contracts. It intentionally excludes AWS SDK and Lambda runtime concerns.

pub mod contract;
pub mod evaluation;
