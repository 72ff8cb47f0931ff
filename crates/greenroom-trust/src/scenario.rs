//! Scenario definitions: what a passing run looks like, declared up
//! front as weighted assertions over observable state.

use serde::{Deserialize, Serialize};

use greenroom_core::RiskLevel;

use crate::DEFAULT_THRESHOLD;

/// A scenario: the service under rehearsal, a pass threshold, and the
/// assertions that define success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub service: String,
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    pub assertions: Vec<Assertion>,
}

fn default_threshold() -> u8 {
    DEFAULT_THRESHOLD
}

/// Weight class of an assertion. Failing an assertion deducts its
/// class's points from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionWeight {
    Critical,
    High,
    Medium,
    Low,
}

impl AssertionWeight {
    pub fn deduction(self) -> u32 {
        match self {
            AssertionWeight::Critical => 35,
            AssertionWeight::High => 20,
            AssertionWeight::Medium => 10,
            AssertionWeight::Low => 5,
        }
    }
}

/// One named, weighted boolean check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    pub name: String,
    pub weight: AssertionWeight,
    #[serde(flatten)]
    pub check: AssertionCheck,
}

/// The closed set of observable-state checks a scenario may use. Every
/// check reads the state store or its logs; none inspect relay
/// internals, so a score is reproducible from the store alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum AssertionCheck {
    /// At least one object of this type matches the equality filter.
    ObjectExists {
        service: String,
        object_type: String,
        #[serde(default)]
        filter: serde_json::Map<String, serde_json::Value>,
    },
    /// Exactly `equals` objects match the equality filter.
    ObjectCount {
        service: String,
        object_type: String,
        #[serde(default)]
        filter: serde_json::Map<String, serde_json::Value>,
        equals: usize,
    },
    /// No risk event at or above this severity was logged.
    NoRiskAbove { level: RiskLevel },
    /// At most `max` risk events at or above this severity.
    RiskCountAtMost { level: RiskLevel, max: usize },
    /// The agent called this tool at least once.
    ToolCalled { service: String, tool: String },
    /// The agent never called this tool.
    ToolNotCalled { service: String, tool: String },
    /// Total money moved by financial actions stays within bound.
    FinancialTotalAtMost { max: f64 },
}
