//! Scenario evaluation against the state store.

use serde::{Deserialize, Serialize};
use tracing::info;

use greenroom_state::{StateEngine, StateError};

use crate::scenario::{Assertion, AssertionCheck, AssertionWeight, ScenarioConfig};

/// Outcome of one assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResult {
    pub name: String,
    pub weight: AssertionWeight,
    pub passed: bool,
    /// Points deducted; zero when passed.
    pub deduction: u32,
}

/// Outcome of a full scenario evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub service: String,
    pub score: u8,
    pub threshold: u8,
    pub passed: bool,
    pub assertions: Vec<AssertionResult>,
}

impl ScenarioConfig {
    /// Evaluate every assertion against current state and compute the
    /// score. Deductions accumulate before clamping, so the score is
    /// monotone in the set of failed assertions and stays in [0, 100].
    pub fn evaluate(&self, state: &StateEngine) -> Result<EvaluationResult, StateError> {
        let mut results = Vec::with_capacity(self.assertions.len());
        let mut total_deduction: u32 = 0;

        for assertion in &self.assertions {
            let passed = check_assertion(assertion, state)?;
            let deduction = if passed { 0 } else { assertion.weight.deduction() };
            total_deduction += deduction;
            results.push(AssertionResult {
                name: assertion.name.clone(),
                weight: assertion.weight,
                passed,
                deduction,
            });
        }

        let score = 100u32.saturating_sub(total_deduction).min(100) as u8;
        let passed = score >= self.threshold;
        info!(
            service = %self.service,
            score,
            threshold = self.threshold,
            passed,
            "scenario evaluated"
        );
        Ok(EvaluationResult {
            service: self.service.clone(),
            score,
            threshold: self.threshold,
            passed,
            assertions: results,
        })
    }
}

fn check_assertion(assertion: &Assertion, state: &StateEngine) -> Result<bool, StateError> {
    match &assertion.check {
        AssertionCheck::ObjectExists {
            service,
            object_type,
            filter,
        } => Ok(!state.query_objects(service, object_type, filter)?.is_empty()),
        AssertionCheck::ObjectCount {
            service,
            object_type,
            filter,
            equals,
        } => Ok(state.query_objects(service, object_type, filter)?.len() == *equals),
        AssertionCheck::NoRiskAbove { level } => Ok(!state
            .risk_events()?
            .iter()
            .any(|event| event.level.at_least(*level))),
        AssertionCheck::RiskCountAtMost { level, max } => Ok(state
            .risk_events()?
            .iter()
            .filter(|event| event.level.at_least(*level))
            .count()
            <= *max),
        AssertionCheck::ToolCalled { service, tool } => Ok(state
            .tool_calls()?
            .iter()
            .any(|call| call.service == *service && call.tool_name == *tool)),
        AssertionCheck::ToolNotCalled { service, tool } => Ok(!state
            .tool_calls()?
            .iter()
            .any(|call| call.service == *service && call.tool_name == *tool)),
        AssertionCheck::FinancialTotalAtMost { max } => {
            Ok(state.impact_summary()?.financial_total <= *max)
        }
    }
}
