//! Agent-facing JSON-RPC server over stdio.
//!
//! The agent sees one server with one merged tool catalog; every
//! `tools/call` goes through [`Relay::call_tool`]. Relay-level failures
//! come back as tool error envelopes, not protocol errors, so the agent
//! experiences a flaky API rather than a broken transport.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use greenroom_core::{
    InitializeResult, JsonRpcRequest, JsonRpcResponse, ServerCapabilities, ServerInfo,
    ToolCallParams, ToolCallResult, ToolListResult, ToolsCapability, INTERNAL_ERROR,
    INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION,
};

use crate::relay::Relay;

pub struct RelayServer {
    relay: Arc<Relay>,
}

impl RelayServer {
    pub fn new(relay: Arc<Relay>) -> Self {
        RelayServer { relay }
    }

    /// Serve the agent over stdio until EOF. Logging goes to stderr;
    /// stdout carries only JSON-RPC.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        info!(
            tools = self.relay.registry().len(),
            "relay ready (stdio transport)"
        );

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

        info!("agent disconnected");
        Ok(())
    }

    /// Process a single JSON-RPC message and return an optional response.
    /// Returns None for notifications (no id). Malformed frames answer
    /// with a parse error and leave the connection open.
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
                        name: "greenroom".to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                };
                Some(to_success(id, result))
            }
            "tools/list" => {
                let result = ToolListResult {
                    tools: self.relay.registry().catalog().to_vec(),
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

                let result = match self.relay.call_tool(&params.name, params.arguments).await {
                    Ok(result) => result,
                    Err(err) => ToolCallResult::error(err.to_string()),
                };
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
