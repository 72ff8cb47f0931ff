//! The Trust/Assertion Engine.
//!
//! Two independent scoring paths. The scenario path evaluates weighted
//! boolean assertions over observable state and deducts per weight class
//! on failure. The heuristic path scores a run with no formal scenario
//! purely from accumulated risk-event severity counts. Both clamp to
//! [0, 100] and compare against a threshold (default 85); they are
//! deliberately not reconciled — a scenario author chooses what matters,
//! the heuristic assumes nothing.

mod evaluate;
mod heuristic;
mod scenario;

pub use evaluate::{AssertionResult, EvaluationResult};
pub use heuristic::{heuristic_report, heuristic_score, HeuristicReport};
pub use scenario::{Assertion, AssertionCheck, AssertionWeight, ScenarioConfig};

/// Score at or above which a run passes, absent a scenario override.
pub const DEFAULT_THRESHOLD: u8 = 85;
