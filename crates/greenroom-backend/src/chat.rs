//! Reference chat backend: messages with a recipient.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use greenroom_core::{RiskEvent, RiskLevel, ToolCallResult, ToolDef, INJECTION_TOOL_PREFIX};
use greenroom_state::{ServiceSchema, StateEngine, StateError};

const SERVICE: &str = "chat";

pub struct ChatBackend {
    state: Arc<StateEngine>,
}

#[derive(Deserialize)]
struct SendMessageParams {
    recipient: String,
    body: String,
}

#[derive(Deserialize)]
struct ListMessagesParams {
    #[serde(default)]
    with: Option<String>,
}

#[derive(Deserialize)]
struct InjectParams {
    sender: String,
    recipient: String,
    body: String,
}

impl ChatBackend {
    pub fn new(state: Arc<StateEngine>) -> Result<Self, StateError> {
        state.register_service(&ServiceSchema::new(SERVICE, &["message"]))?;
        Ok(ChatBackend { state })
    }

    fn send_message(&self, params: SendMessageParams) -> Result<ToolCallResult, StateError> {
        if params.recipient.trim().is_empty() {
            return Ok(ToolCallResult::error("Recipient is required".to_string()));
        }
        let message = self.state.create_object(
            SERVICE,
            "message",
            None,
            serde_json::json!({
                "direction": "outbound",
                "sender": "agent",
                "recipient": params.recipient,
                "body": params.body,
            }),
        )?;
        self.state.log_event(
            &RiskEvent::new(
                SERVICE,
                "send_message",
                RiskLevel::Info,
                &format!("Message sent to {}", params.recipient),
            )
            .with_object("message", &message.id)
            .with_details(serde_json::json!({"recipient": params.recipient})),
        )?;
        info!(recipient = %params.recipient, message = %message.id, "message sent");
        Ok(ToolCallResult::json(&serde_json::to_value(&message)?))
    }

    fn list_messages(&self, params: ListMessagesParams) -> Result<ToolCallResult, StateError> {
        let mut filter = serde_json::Map::new();
        if let Some(with) = params.with {
            filter.insert("recipient".to_string(), serde_json::json!(with));
        }
        let messages = self.state.query_objects(SERVICE, "message", &filter)?;
        Ok(ToolCallResult::json(&serde_json::to_value(&messages)?))
    }

    /// Hidden injection entry point: a message appears in the world as
    /// if a third party sent it.
    fn inject_message(&self, params: InjectParams) -> Result<ToolCallResult, StateError> {
        let message = self.state.create_object(
            SERVICE,
            "message",
            None,
            serde_json::json!({
                "direction": "inbound",
                "sender": params.sender,
                "recipient": params.recipient,
                "body": params.body,
            }),
        )?;
        self.state.log_event(
            &RiskEvent::new(
                SERVICE,
                "inject_message",
                RiskLevel::Info,
                "Message injected by observer",
            )
            .with_object("message", &message.id)
            .with_details(serde_json::json!({"sender": params.sender, "injected": true})),
        )?;
        Ok(ToolCallResult::json(&serde_json::to_value(&message)?))
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    arguments: Option<HashMap<String, serde_json::Value>>,
) -> Result<T, ToolCallResult> {
    let map: serde_json::Map<String, serde_json::Value> =
        arguments.unwrap_or_default().into_iter().collect();
    serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|e| ToolCallResult::error(format!("Invalid arguments: {}", e)))
}

macro_rules! try_parse {
    ($arguments:expr) => {
        match parse($arguments) {
            Ok(params) => params,
            Err(result) => return result,
        }
    };
}

#[async_trait]
impl super::ServiceTools for ChatBackend {
    fn service_name(&self) -> &str {
        SERVICE
    }

    fn tool_definitions(&self) -> Vec<ToolDef> {
        vec![
            ToolDef {
                name: "send_message".to_string(),
                description: "Send a chat message".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "recipient": {"type": "string"},
                        "body": {"type": "string"}
                    },
                    "required": ["recipient", "body"]
                }),
            },
            ToolDef {
                name: "list_messages".to_string(),
                description: "List messages, optionally for one correspondent".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {"with": {"type": "string"}}
                }),
            },
        ]
    }

    fn injection_tools(&self) -> Vec<ToolDef> {
        vec![ToolDef {
            name: format!("{}{}", INJECTION_TOOL_PREFIX, SERVICE),
            description: "Inject an inbound message into the world".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "sender": {"type": "string"},
                    "recipient": {"type": "string"},
                    "body": {"type": "string"}
                },
                "required": ["sender", "recipient", "body"]
            }),
        }]
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<HashMap<String, serde_json::Value>>,
    ) -> ToolCallResult {
        let result = match name {
            "send_message" => self.send_message(try_parse!(arguments)),
            "list_messages" => self.list_messages(try_parse!(arguments)),
            _ if name == format!("{}{}", INJECTION_TOOL_PREFIX, SERVICE) => {
                self.inject_message(try_parse!(arguments))
            }
            _ => return ToolCallResult::error(format!("Unknown tool: {}", name)),
        };
        match result {
            Ok(result) => result,
            Err(err) => ToolCallResult::error(format!("Storage error: {}", err)),
        }
    }
}
