//! # memberd-sync
//!
//! Fan-out sync engine and per-target change-set generators.
//!
//! Build a [`Orchestrator`] from a fixed list of [`SyncAction`]s and a
//! snapshot refresher; call [`Orchestrator::sync`] to run one full cycle.
//! Failures of individual targets are isolated and logged, never propagated.

pub mod engine;
pub mod error;
pub mod generators;
pub mod lists;

pub use engine::{run_isolated, Orchestrator, SyncAction, SyncState};
pub use error::SyncError;
pub use lists::{ApplyResult, ListChanges, ListDescriptor, Subscription};
