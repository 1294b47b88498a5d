#![allow(dead_code)]

use std::sync::Arc;

use mcp_record_server::dispatcher::Dispatcher;
use mcp_record_server::handlers;
use mcp_record_server::protocol::{JsonRpcRequest, JsonRpcResponse};
use mcp_record_server::seed;
use mcp_record_server::store::{DataService, MemoryStore};

/// A dispatcher over the demo data with `find_books_by_author` registered.
pub fn demo_dispatcher() -> Dispatcher {
    let memory = MemoryStore::new("demo");
    seed::apply(&memory, seed::demo_resources()).unwrap();
    let store: Arc<dyn DataService> = Arc::new(memory);
    let dispatcher = Dispatcher::new(Arc::clone(&store)).unwrap();
    seed::register_demo_tools(dispatcher.registry(), store, "demo").unwrap();
    dispatcher
}

/// A dispatcher over the demo data with only the built-in tools.
pub fn builtin_dispatcher() -> Dispatcher {
    let memory = MemoryStore::new("demo");
    seed::apply(&memory, seed::demo_resources()).unwrap();
    Dispatcher::new(Arc::new(memory)).unwrap()
}

pub async fn rpc(
    dispatcher: &Dispatcher,
    id: i64,
    method: &str,
    params: Option<serde_json::Value>,
) -> JsonRpcResponse {
    let req = JsonRpcRequest::new(id, method, params);
    handlers::dispatch(&req, dispatcher).await.unwrap()
}

/// Call a tool and return `(is_error, parsed text content)`.
pub async fn call_tool(
    dispatcher: &Dispatcher,
    name: &str,
    arguments: serde_json::Value,
) -> (bool, serde_json::Value) {
    let resp = rpc(
        dispatcher,
        1,
        "tools/call",
        Some(serde_json::json!({ "name": name, "arguments": arguments })),
    )
    .await;
    assert!(resp.error.is_none(), "tools/call must not fail at the protocol level");
    let result = resp.result.unwrap();
    let is_error = result["isError"].as_bool().unwrap_or(false);
    let text = result["content"][0]["text"].as_str().unwrap();
    (is_error, serde_json::from_str(text).unwrap())
}

pub fn ids(records: &serde_json::Value) -> Vec<String> {
    records
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect()
}
