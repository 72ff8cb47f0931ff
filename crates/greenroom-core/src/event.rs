//! The wire unit on the Event Bus.

use serde::{Deserialize, Serialize};

use crate::time::now_ms;

/// Kind of event broadcast to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyEventKind {
    ToolCall,
    ToolResponse,
    RiskEvent,
    Status,
    Report,
    ChaosInjected,
}

/// One entry in the observer stream and the retained replay log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyEvent {
    #[serde(rename = "type")]
    pub kind: ProxyEventKind,
    pub timestamp_ms: i64,
    pub data: serde_json::Value,
}

impl ProxyEvent {
    pub fn new(kind: ProxyEventKind, data: serde_json::Value) -> Self {
        ProxyEvent {
            kind,
            timestamp_ms: now_ms(),
            data,
        }
    }
}
