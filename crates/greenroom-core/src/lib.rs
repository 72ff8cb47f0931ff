mod error;
mod event;
mod protocol;
mod risk;
mod time;

pub use error::RelayError;
pub use event::{ProxyEvent, ProxyEventKind};
pub use protocol::{
    is_injection_tool, silent_flag_set, strip_silent_flag, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ServerCapabilities, ServerInfo, ToolCallParams,
    ToolCallResult, ToolContent, ToolDef, ToolListResult, ToolsCapability, INJECTION_TOOL_PREFIX,
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
    PROTOCOL_VERSION, SILENT_FLAG,
};
pub use risk::{amount_risk_level, RiskEvent, RiskLevel, ToolCallRecord};
pub use time::now_ms;
