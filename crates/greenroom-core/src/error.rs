//! Relay error taxonomy.

/// Errors surfaced by the relay and its backend connections.
///
/// Tool-level domain failures (unknown object id, over-refund, ...) are
/// NOT errors here — they travel as `ToolCallResult::error` envelopes.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RelayError {
    /// Tool name not present in any backend's catalog.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Agent attempted a reserved internal injection tool.
    #[error("Unknown tool: {0}")]
    ReservedTool(String),

    /// The owning backend's connection is absent or has exited.
    #[error("Service '{0}' is unavailable")]
    ServiceUnavailable(String),

    /// A pending request exceeded its bounded timeout.
    #[error("Request '{method}' to backend '{service}' timed out after {seconds}s")]
    Timeout {
        service: String,
        method: String,
        seconds: u64,
    },

    /// The backend process exited with requests still pending.
    #[error("Connection to backend '{0}' closed")]
    ConnectionClosed(String),

    /// The backend answered with a protocol-level JSON-RPC error.
    #[error("Backend '{service}' returned error {code}: {message}")]
    Backend {
        service: String,
        code: i32,
        message: String,
    },

    /// Malformed frame or unexpected shape on a connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Shared state store failure while recording or reporting.
    #[error("State error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_names_method_and_backend() {
        let err = RelayError::Timeout {
            service: "payments".to_string(),
            method: "tools/call".to_string(),
            seconds: 30,
        };
        let msg = err.to_string();
        assert!(msg.contains("payments"));
        assert!(msg.contains("tools/call"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn test_reserved_tool_indistinguishable_from_unknown() {
        // The agent must not be able to probe for internal tool names.
        let reserved = RelayError::ReservedTool("__greenroom_inject_payments".to_string());
        let unknown = RelayError::UnknownTool("__greenroom_inject_payments".to_string());
        assert_eq!(reserved.to_string(), unknown.to_string());
    }
}
