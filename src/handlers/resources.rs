use crate::dispatcher::Dispatcher;
use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ReadResourceParams};

/// Handle `resources/list`. Always succeeds; see [`Dispatcher::list_resources`].
pub async fn list(req: &JsonRpcRequest, dispatcher: &Dispatcher) -> JsonRpcResponse {
    let resources = dispatcher.list_resources().await;
    JsonRpcResponse::success(
        req.id.clone(),
        serde_json::json!({ "resources": resources }),
    )
}

/// Handle `resources/read`. An unknown URI fails the whole call.
pub async fn read(req: &JsonRpcRequest, dispatcher: &Dispatcher) -> JsonRpcResponse {
    let params: ReadResourceParams = match super::parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match dispatcher.read_resource(&params.uri).await {
        Ok(contents) => JsonRpcResponse::success(
            req.id.clone(),
            serde_json::json!({ "contents": [contents] }),
        ),
        Err(mcp_err) => JsonRpcResponse::error(req.id.clone(), JsonRpcError::from(mcp_err)),
    }
}
