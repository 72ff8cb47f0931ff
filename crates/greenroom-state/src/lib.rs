//! The State Engine — a generic, schema-driven object store plus an
//! append-only risk/audit event log.
//!
//! Backed by an embedded SQLite store (WAL) so the relay, independently
//! running backend processes, and the scoring engine all observe one
//! state file for the duration of a run. An in-memory mode exists for
//! single-process runs and tests. Durability beyond a single run is a
//! non-goal.
//!
//! All aggregates (`impact_summary`) are derived from the log on demand,
//! never tracked separately, so a report can always be rebuilt from the
//! log alone.

mod engine;
mod objects;
mod summary;

pub use engine::{StateEngine, StateError};
pub use objects::{ServiceSchema, StateObject};
pub use summary::ImpactSummary;
