pub mod resources;
pub mod tools;

use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::protocol::{InitializeParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// MCP protocol revision advertised during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Dispatch a JSON-RPC request to the appropriate handler.
///
/// Returns `None` for notifications (no response required).
pub async fn dispatch(req: &JsonRpcRequest, dispatcher: &Dispatcher) -> Option<JsonRpcResponse> {
    match req.method.as_str() {
        "initialize" => {
            if let Some(params) = &req.params {
                match serde_json::from_value::<InitializeParams>(params.clone()) {
                    Ok(params) => {
                        let client = params.client_info.and_then(|c| c.name);
                        info!(
                            client = client.as_deref().unwrap_or("unknown"),
                            protocol = params.protocol_version.as_deref().unwrap_or("unspecified"),
                            "client initialized"
                        );
                    }
                    Err(e) => warn!(error = %e, "ignoring malformed initialize params"),
                }
            }
            let result = serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "resources": {},
                    "tools": {}
                },
                "serverInfo": {
                    "name": "mcp-record-server",
                    "version": env!("CARGO_PKG_VERSION")
                }
            });
            Some(JsonRpcResponse::success(req.id.clone(), result))
        }

        "notifications/initialized" => None,

        "ping" => Some(JsonRpcResponse::success(req.id.clone(), serde_json::json!({}))),

        "resources/list" => Some(resources::list(req, dispatcher).await),

        "resources/read" => Some(resources::read(req, dispatcher).await),

        "tools/list" => Some(tools::list(req, dispatcher)),

        "tools/call" => Some(tools::call(req, dispatcher).await),

        _ => Some(JsonRpcResponse::error(
            req.id.clone(),
            JsonRpcError::method_not_found(&req.method),
        )),
    }
}

/// Decode `params` into `T`, or build the `-32602` response for `method`.
fn parse_params<T: serde::de::DeserializeOwned>(
    req: &JsonRpcRequest,
) -> Result<T, JsonRpcResponse> {
    match &req.params {
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            warn!(method = %req.method, error = %e, "invalid params");
            JsonRpcResponse::error(
                req.id.clone(),
                JsonRpcError::invalid_params(format!("Invalid {} params: {e}", req.method)),
            )
        }),
        None => {
            warn!(method = %req.method, "missing params");
            Err(JsonRpcResponse::error(
                req.id.clone(),
                JsonRpcError::invalid_params(format!("Missing params for {}", req.method)),
            ))
        }
    }
}
