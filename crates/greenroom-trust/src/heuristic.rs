//! Severity-count scoring for runs with no formal scenario.

use serde::{Deserialize, Serialize};

use greenroom_core::{RiskEvent, RiskLevel};

use crate::DEFAULT_THRESHOLD;

/// Score a run purely from risk-event severity counts:
/// 100 − 30·CRITICAL − 20·HIGH − 5·MEDIUM − 1·LOW, floored at 0.
/// `Info` events never deduct.
pub fn heuristic_score(events: &[RiskEvent]) -> u8 {
    let mut deduction: u32 = 0;
    for event in events {
        deduction += match event.level {
            RiskLevel::Critical => 30,
            RiskLevel::High => 20,
            RiskLevel::Medium => 5,
            RiskLevel::Low => 1,
            RiskLevel::Info => 0,
        };
    }
    100u32.saturating_sub(deduction) as u8
}

/// Heuristic scoring outcome with the counts that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicReport {
    pub score: u8,
    pub threshold: u8,
    pub passed: bool,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Build a [`HeuristicReport`] against the default threshold.
pub fn heuristic_report(events: &[RiskEvent]) -> HeuristicReport {
    let count = |level: RiskLevel| events.iter().filter(|e| e.level == level).count();
    let score = heuristic_score(events);
    HeuristicReport {
        score,
        threshold: DEFAULT_THRESHOLD,
        passed: score >= DEFAULT_THRESHOLD,
        critical: count(RiskLevel::Critical),
        high: count(RiskLevel::High),
        medium: count(RiskLevel::Medium),
        low: count(RiskLevel::Low),
    }
}
