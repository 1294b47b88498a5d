use tracing::error;

use crate::dispatcher::Dispatcher;
use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolCallParams};

/// Handle `tools/list`.
pub fn list(req: &JsonRpcRequest, dispatcher: &Dispatcher) -> JsonRpcResponse {
    let tools = dispatcher.list_tools();
    JsonRpcResponse::success(req.id.clone(), serde_json::json!({ "tools": tools }))
}

/// Handle `tools/call`. Tool-level failures come back as a successful
/// JSON-RPC response whose result has `isError: true`.
pub async fn call(req: &JsonRpcRequest, dispatcher: &Dispatcher) -> JsonRpcResponse {
    let params: ToolCallParams = match super::parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let tool_result = dispatcher.call_tool(&params.name, params.arguments).await;
    match serde_json::to_value(&tool_result) {
        Ok(result) => JsonRpcResponse::success(req.id.clone(), result),
        Err(e) => {
            error!(error = %e, "failed to serialize tool result");
            JsonRpcResponse::error(req.id.clone(), JsonRpcError::internal_error(e.to_string()))
        }
    }
}
