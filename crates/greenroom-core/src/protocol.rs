//! JSON-RPC 2.0 wire types shared by the relay and simulated backends.
//!
//! Both sides of every connection speak the same line-delimited framing:
//! the agent talks to the relay with it, and the relay talks to each
//! backend process with it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Protocol version advertised during the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Naming convention marking a backend's hidden world-injection tool.
/// Tools with this prefix are never advertised in a catalog and are
/// rejected outright when an agent requests them through the normal call
/// path; only the relay's own injection logic may invoke them.
pub const INJECTION_TOOL_PREFIX: &str = "__greenroom_inject_";

/// Hidden argument key requesting silent mode for a call. Silent calls
/// (background polling) skip call/response events and latency padding but
/// are still risk-scanned.
pub const SILENT_FLAG: &str = "_greenroom_silent";

/// Returns true if the tool name is reserved for internal world injection.
pub fn is_injection_tool(name: &str) -> bool {
    name.starts_with(INJECTION_TOOL_PREFIX)
}

/// Returns true if the arguments carry the silent-mode flag.
pub fn silent_flag_set(args: &HashMap<String, serde_json::Value>) -> bool {
    args.get(SILENT_FLAG)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Removes the silent-mode flag so backends never see it.
pub fn strip_silent_flag(args: &mut HashMap<String, serde_json::Value>) {
    args.remove(SILENT_FLAG);
}

/// JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Build a request carrying an id (expects a response).
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(id)),
            method: method.to_string(),
            params,
        }
    }

    /// Build a fire-and-forget notification (no id, no response).
    pub fn notification(method: &str, params: Option<serde_json::Value>) -> Self {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.to_string(),
            params,
        }
    }

    /// A request without an id is a notification and must not be answered.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() || self.id == Some(serde_json::Value::Null)
    }
}

/// JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: String) -> Self {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    /// The request id as a u64, when it was assigned by our client side.
    pub fn id_u64(&self) -> Option<u64> {
        self.id.as_ref().and_then(|v| v.as_u64())
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// JSON-RPC error codes.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Capabilities advertised during the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// `initialize` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// Tool definition as exposed in a catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// `tools/list` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolListResult {
    pub tools: Vec<ToolDef>,
}

/// `tools/call` params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<HashMap<String, serde_json::Value>>,
}

/// Content blocks returned from tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Tool call result envelope. Domain failures travel inside a successful
/// envelope with `is_error` set, never as protocol-level errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    pub fn text(text: String) -> Self {
        ToolCallResult {
            content: vec![ToolContent::Text { text }],
            is_error: None,
        }
    }

    /// Serialize a value as pretty JSON text content.
    pub fn json(value: &serde_json::Value) -> Self {
        let text = serde_json::to_string_pretty(value)
            .unwrap_or_else(|_| value.to_string());
        Self::text(text)
    }

    pub fn error(message: String) -> Self {
        ToolCallResult {
            content: vec![ToolContent::Text { text: message }],
            is_error: Some(true),
        }
    }

    /// Concatenated text content, used for risk scanning responses.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
