//! Backend server loop — reads JSON-RPC from stdin, writes to stdout.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use greenroom_core::{
    InitializeResult, JsonRpcRequest, JsonRpcResponse, ServerCapabilities, ServerInfo,
    ToolCallParams, ToolCallResult, ToolDef, ToolListResult, ToolsCapability, INTERNAL_ERROR,
    INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION,
};

/// The tools one simulated service exposes.
///
/// `tool_definitions` is the public catalog the relay merges and shows
/// the agent. `injection_tools` are the hidden world-injection entry
/// points: listed to the relay over `internal/tools`, never in
/// `tools/list`, and invoked only by the relay's own injection logic.
/// `call_tool` dispatches both.
#[async_trait]
pub trait ServiceTools: Send + Sync {
    fn service_name(&self) -> &str;
    fn tool_definitions(&self) -> Vec<ToolDef>;
    fn injection_tools(&self) -> Vec<ToolDef>;
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<HashMap<String, serde_json::Value>>,
    ) -> ToolCallResult;
}

/// JSON-RPC server over stdio, generic over the service behind it.
pub struct BackendServer<T: ServiceTools> {
    tools: T,
}

impl<T: ServiceTools> BackendServer<T> {
    pub fn new(tools: T) -> Self {
        BackendServer { tools }
    }

    /// Run the server, reading messages from stdin and writing responses
    /// to stdout. Logging goes to stderr; stdout carries only JSON-RPC.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        info!(service = self.tools.service_name(), "backend started (stdio transport)");

        while let Some(line) = lines.next_line().await? {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            debug!("Received: {}", line);

            if let Some(resp) = self.handle_message(&line).await {
                let json = serde_json::to_string(&resp)?;
                debug!("Sending: {}", json);
                stdout.write_all(json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        info!(service = self.tools.service_name(), "backend shutting down");
        Ok(())
    }

    /// Process a single JSON-RPC message and return an optional response.
    /// Returns None for notifications (no id).
    pub async fn handle_message(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        };

        if request.is_notification() {
            debug!("Notification: {}", request.method);
            return None;
        }

        let id = request.id.clone();

        match request.method.as_str() {
            "initialize" => {
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    capabilities: ServerCapabilities {
                        tools: Some(ToolsCapability {
                            list_changed: Some(false),
                        }),
                    },
                    server_info: ServerInfo {
                        name: self.tools.service_name().to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                };
                Some(to_success(id, result))
            }
            "tools/list" => {
                let result = ToolListResult {
                    tools: self.tools.tool_definitions(),
                };
                Some(to_success(id, result))
            }
            "internal/tools" => {
                let result = ToolListResult {
                    tools: self.tools.injection_tools(),
                };
                Some(to_success(id, result))
            }
            "tools/call" => {
                let params: ToolCallParams = match request.params {
                    Some(p) => match serde_json::from_value(p) {
                        Ok(params) => params,
                        Err(e) => {
                            return Some(JsonRpcResponse::error(
                                id,
                                INVALID_PARAMS,
                                format!("Invalid params: {}", e),
                            ))
                        }
                    },
                    None => {
                        return Some(JsonRpcResponse::error(
                            id,
                            INVALID_PARAMS,
                            "Missing params".to_string(),
                        ))
                    }
                };

                let result = self.tools.call_tool(&params.name, params.arguments).await;
                Some(to_success(id, result))
            }
            "ping" => Some(JsonRpcResponse::success(id, serde_json::json!({}))),
            _ => Some(JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Unknown method: {}", request.method),
            )),
        }
    }
}

fn to_success<S: serde::Serialize>(
    id: Option<serde_json::Value>,
    result: S,
) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(v) => JsonRpcResponse::success(id, v),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Serialization error: {}", e)),
    }
}
