use std::time::Duration;

use serde::{Deserialize, Serialize};

use greenroom_core::{ProxyEvent, ProxyEventKind, ToolCallResult};

/// Prefix used in substituted error messages to distinguish injected
/// faults from real backend errors.
pub const CHAOS_PREFIX: &str = "[chaos]";

/// A delayed side-channel event scheduled by an effect. Delivered to the
/// Event Bus after `delay_ms`, without blocking the call that consumed
/// the effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Followup {
    pub delay_ms: u64,
    pub data: serde_json::Value,
}

impl Followup {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn into_event(self) -> ProxyEvent {
        ProxyEvent::new(ProxyEventKind::Status, self.data)
    }
}

/// One armed fault. Deserialized directly from observer commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChaosEffect {
    /// Pure delay before the real call is forwarded.
    Latency { ms: u64 },
    /// Short-circuit with a tool error; the real call never happens.
    ToolError { message: String },
    /// Short-circuit with a fabricated successful response.
    Substitute { response: serde_json::Value },
    /// Short-circuit like `Substitute`, then emit a delayed
    /// side-channel event (a confirmation arriving "later", a webhook).
    SubstituteWithFollowup {
        response: serde_json::Value,
        followup: Followup,
    },
}

/// What the relay should do with the call that consumed an effect.
#[derive(Debug, Clone)]
pub enum Intercept {
    /// Delay, then forward the real call.
    Delay(Duration),
    /// Return this response to the agent; do not forward.
    Respond(ToolCallResult),
    /// As `Respond`, plus a scheduled side-channel event.
    RespondWithFollowup(ToolCallResult, Followup),
}

impl ChaosEffect {
    /// Dispatch the effect against a call. Pure: no queue access, no
    /// clock, no IO. The `(service, tool, args)` triple is available to
    /// every effect type even where current ones ignore it.
    pub fn apply(
        &self,
        _service: &str,
        _tool: &str,
        _args: &serde_json::Value,
    ) -> Intercept {
        match self {
            ChaosEffect::Latency { ms } => Intercept::Delay(Duration::from_millis(*ms)),
            ChaosEffect::ToolError { message } => {
                Intercept::Respond(ToolCallResult::error(format!("{} {}", CHAOS_PREFIX, message)))
            }
            ChaosEffect::Substitute { response } => {
                Intercept::Respond(ToolCallResult::json(response))
            }
            ChaosEffect::SubstituteWithFollowup { response, followup } => {
                Intercept::RespondWithFollowup(ToolCallResult::json(response), followup.clone())
            }
        }
    }

    /// Short label used in `chaos_injected` events.
    pub fn label(&self) -> &'static str {
        match self {
            ChaosEffect::Latency { .. } => "latency",
            ChaosEffect::ToolError { .. } => "tool_error",
            ChaosEffect::Substitute { .. } => "substitute",
            ChaosEffect::SubstituteWithFollowup { .. } => "substitute_with_followup",
        }
    }
}

/// Check if a tool error message originated from an injected fault.
pub fn is_chaos_error(msg: &str) -> bool {
    msg.contains(CHAOS_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_latency_applies_as_delay() {
        let effect = ChaosEffect::Latency { ms: 2500 };
        match effect.apply("payments", "charge", &json!({})) {
            Intercept::Delay(d) => assert_eq!(d, Duration::from_millis(2500)),
            other => panic!("expected delay, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_error_is_marked() {
        let effect = ChaosEffect::ToolError {
            message: "gateway unavailable".to_string(),
        };
        match effect.apply("payments", "charge", &json!({})) {
            Intercept::Respond(result) => {
                assert_eq!(result.is_error, Some(true));
                let text = result.text_content();
                assert!(is_chaos_error(&text));
                assert!(text.contains("gateway unavailable"));
            }
            other => panic!("expected respond, got {:?}", other),
        }
    }

    #[test]
    fn test_substitute_short_circuits_with_payload() {
        let effect = ChaosEffect::Substitute {
            response: json!({"status": "declined"}),
        };
        match effect.apply("payments", "charge", &json!({"amount": 10})) {
            Intercept::Respond(result) => {
                assert!(result.is_error.is_none());
                assert!(result.text_content().contains("declined"));
            }
            other => panic!("expected respond, got {:?}", other),
        }
    }

    #[test]
    fn test_followup_carried_without_blocking_shape() {
        let effect = ChaosEffect::SubstituteWithFollowup {
            response: json!({"status": "accepted"}),
            followup: Followup {
                delay_ms: 500,
                data: json!({"note": "settlement reversed"}),
            },
        };
        match effect.apply("payments", "charge", &json!({})) {
            Intercept::RespondWithFollowup(result, followup) => {
                assert!(result.is_error.is_none());
                assert_eq!(followup.delay(), Duration::from_millis(500));
                assert_eq!(followup.data["note"], "settlement reversed");
            }
            other => panic!("expected respond-with-followup, got {:?}", other),
        }
    }

    #[test]
    fn test_effect_deserializes_from_observer_shape() {
        let effect: ChaosEffect =
            serde_json::from_value(json!({"type": "latency", "ms": 3000})).unwrap();
        assert!(matches!(effect, ChaosEffect::Latency { ms: 3000 }));

        let effect: ChaosEffect = serde_json::from_value(
            json!({"type": "tool_error", "message": "boom"}),
        )
        .unwrap();
        assert_eq!(effect.label(), "tool_error");
    }
}
