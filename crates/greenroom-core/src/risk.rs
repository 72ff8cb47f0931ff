//! Risk events and tool call records — the policy-relevant audit units.

use serde::{Deserialize, Serialize};

use crate::time::now_ms;

/// Severity of a risk event. Ordering is by severity: `Critical` ranks
/// above `High`, down to `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl RiskLevel {
    /// Numeric rank, higher is more severe.
    pub fn rank(self) -> u8 {
        match self {
            RiskLevel::Critical => 4,
            RiskLevel::High => 3,
            RiskLevel::Medium => 2,
            RiskLevel::Low => 1,
            RiskLevel::Info => 0,
        }
    }

    pub fn at_least(self, floor: RiskLevel) -> bool {
        self.rank() >= floor.rank()
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::High => "HIGH",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Low => "LOW",
            RiskLevel::Info => "INFO",
        };
        f.write_str(s)
    }
}

/// Severity of a money movement, graded by dollar amount. Shared by
/// backends logging their own actions and by the relay's cross-cutting
/// financial scan, so the two never disagree on how bad a number is.
pub fn amount_risk_level(amount: f64) -> RiskLevel {
    if amount >= 10_000.0 {
        RiskLevel::Critical
    } else if amount >= 1_000.0 {
        RiskLevel::High
    } else if amount >= 250.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Append-only record of a policy-relevant action, produced by backends
/// and by the relay's own cross-cutting checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub timestamp_ms: i64,
    pub service: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    pub level: RiskLevel,
    pub reason: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl RiskEvent {
    pub fn new(service: &str, action: &str, level: RiskLevel, reason: &str) -> Self {
        RiskEvent {
            timestamp_ms: now_ms(),
            service: service.to_string(),
            action: action.to_string(),
            object_type: None,
            object_id: None,
            level,
            reason: reason.to_string(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_object(mut self, object_type: &str, object_id: &str) -> Self {
        self.object_type = Some(object_type.to_string());
        self.object_id = Some(object_id.to_string());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// One forwarded tool call: created when the call leaves the relay,
/// completed on backend response or fault short-circuit. Immutable after
/// completion except for `duration_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: i64,
    pub timestamp_ms: i64,
    pub service: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    /// None while the call is pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Critical.rank() > RiskLevel::High.rank());
        assert!(RiskLevel::High.rank() > RiskLevel::Medium.rank());
        assert!(RiskLevel::Medium.rank() > RiskLevel::Low.rank());
        assert!(RiskLevel::Low.rank() > RiskLevel::Info.rank());
        assert!(RiskLevel::High.at_least(RiskLevel::Medium));
        assert!(!RiskLevel::Low.at_least(RiskLevel::High));
    }

    #[test]
    fn test_risk_level_serde_uppercase() {
        let json = serde_json::to_string(&RiskLevel::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        let level: RiskLevel = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(level, RiskLevel::Medium);
    }

    #[test]
    fn test_amount_risk_thresholds() {
        assert_eq!(amount_risk_level(50.0), RiskLevel::Low);
        assert_eq!(amount_risk_level(400.0), RiskLevel::Medium);
        assert_eq!(amount_risk_level(4_999.0), RiskLevel::High);
        assert_eq!(amount_risk_level(10_000.0), RiskLevel::Critical);
    }

    #[test]
    fn test_risk_event_builder() {
        let event = RiskEvent::new("payments", "refund", RiskLevel::High, "large refund")
            .with_object("transaction", "txn_1")
            .with_details(serde_json::json!({"amount": 4999.0}));
        assert_eq!(event.service, "payments");
        assert_eq!(event.object_id.as_deref(), Some("txn_1"));
        assert_eq!(event.details["amount"], 4999.0);
        assert!(event.timestamp_ms > 0);
    }
}
