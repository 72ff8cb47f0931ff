//! Impact summary derived from the audit logs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use greenroom_core::{RiskEvent, RiskLevel, ToolCallRecord};

/// Actions whose `details.amount` contributes to the financial total.
const FINANCIAL_ACTIONS: &[&str] = &["charge", "refund", "payment", "transfer", "payout"];

/// Aggregate view of a run, recomputed from the logs on every request.
/// Nothing here is tracked incrementally, so the summary and the logs
/// cannot drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactSummary {
    pub total_calls: usize,
    pub calls_by_service: BTreeMap<String, usize>,
    pub risk_counts: BTreeMap<String, usize>,
    /// Sum of amounts moved by financial actions, in dollars.
    pub financial_total: f64,
    /// Risk events flagged as reaching outside the rehearsal boundary.
    pub external_communications: usize,
}

impl ImpactSummary {
    pub fn derive(calls: &[ToolCallRecord], events: &[RiskEvent]) -> Self {
        let mut calls_by_service = BTreeMap::new();
        for call in calls {
            *calls_by_service.entry(call.service.clone()).or_insert(0) += 1;
        }

        let mut risk_counts = BTreeMap::new();
        let mut financial_total = 0.0;
        let mut external_communications = 0;
        for event in events {
            *risk_counts.entry(event.level.to_string()).or_insert(0) += 1;
            if FINANCIAL_ACTIONS.contains(&event.action.as_str()) {
                if let Some(amount) = event.details.get("amount").and_then(|v| v.as_f64()) {
                    financial_total += amount;
                }
            }
            if event.details.get("external").and_then(|v| v.as_bool()) == Some(true) {
                external_communications += 1;
            }
        }

        ImpactSummary {
            total_calls: calls.len(),
            calls_by_service,
            risk_counts,
            financial_total,
            external_communications,
        }
    }

    /// Count of events at or above the given severity.
    pub fn risk_count_at_least(&self, floor: RiskLevel) -> usize {
        [
            RiskLevel::Critical,
            RiskLevel::High,
            RiskLevel::Medium,
            RiskLevel::Low,
            RiskLevel::Info,
        ]
        .iter()
        .filter(|level| level.at_least(floor))
        .map(|level| self.risk_counts.get(&level.to_string()).copied().unwrap_or(0))
        .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(service: &str) -> ToolCallRecord {
        ToolCallRecord {
            id: 1,
            timestamp_ms: 0,
            service: service.to_string(),
            tool_name: "t".to_string(),
            arguments: json!({}),
            response: None,
            duration_ms: None,
        }
    }

    #[test]
    fn test_derive_counts_and_totals() {
        let calls = vec![call("payments"), call("payments"), call("chat")];
        let events = vec![
            RiskEvent::new("payments", "charge", RiskLevel::Low, "charge")
                .with_details(json!({"amount": 50.0})),
            RiskEvent::new("payments", "refund", RiskLevel::High, "large refund")
                .with_details(json!({"amount": 4999.0})),
            RiskEvent::new("chat", "send_message", RiskLevel::Medium, "external recipient")
                .with_details(json!({"external": true})),
        ];

        let summary = ImpactSummary::derive(&calls, &events);
        assert_eq!(summary.total_calls, 3);
        assert_eq!(summary.calls_by_service["payments"], 2);
        assert_eq!(summary.calls_by_service["chat"], 1);
        assert_eq!(summary.risk_counts["HIGH"], 1);
        assert_eq!(summary.financial_total, 5049.0);
        assert_eq!(summary.external_communications, 1);
    }

    #[test]
    fn test_non_financial_amounts_ignored() {
        let events = vec![RiskEvent::new("chat", "send_message", RiskLevel::Info, "msg")
            .with_details(json!({"amount": 100.0}))];
        let summary = ImpactSummary::derive(&[], &events);
        assert_eq!(summary.financial_total, 0.0);
    }

    #[test]
    fn test_risk_count_at_least() {
        let events = vec![
            RiskEvent::new("a", "x", RiskLevel::Critical, "r"),
            RiskEvent::new("a", "x", RiskLevel::High, "r"),
            RiskEvent::new("a", "x", RiskLevel::Low, "r"),
        ];
        let summary = ImpactSummary::derive(&[], &events);
        assert_eq!(summary.risk_count_at_least(RiskLevel::High), 2);
        assert_eq!(summary.risk_count_at_least(RiskLevel::Info), 3);
    }
}
