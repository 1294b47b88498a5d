//! The four protocol operations over a data service and a tool registry.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::protocol::{
    McpErrorCode, McpErrorResponse, ResourceContents, ResourceDescriptor, ToolResult,
};
use crate::store::{DataService, StoreError, RESOURCE_MIME_TYPE};
use crate::tools::records::register_builtins;
use crate::tools::{ToolDefinition, ToolError, ToolRegistry};

/// Protocol façade. Holds no cross-call lock; each call observes the store
/// as it is at the moment of each data-service operation it issues.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn DataService>,
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    /// Build a dispatcher with the built-in record tools registered.
    pub fn new(store: Arc<dyn DataService>) -> Result<Self, ToolError> {
        let registry = Arc::new(ToolRegistry::new());
        register_builtins(&registry, Arc::clone(&store))?;
        Ok(Self { store, registry })
    }

    pub fn store(&self) -> &Arc<dyn DataService> {
        &self.store
    }

    /// Registry for adding tools at runtime. New tools are listed and
    /// invocable on the next call.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Every resource, in registration order. Never fails: a backend error
    /// is logged and yields an empty list.
    pub async fn list_resources(&self) -> Vec<ResourceDescriptor> {
        match self.store.list_resources().await {
            Ok(resources) => resources
                .into_iter()
                .map(|r| ResourceDescriptor {
                    uri: r.uri,
                    name: r.name,
                    description: r.description,
                    mime_type: RESOURCE_MIME_TYPE.to_string(),
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "listing resources failed; returning empty list");
                Vec::new()
            }
        }
    }

    /// The resource's own metadata as JSON content, not its records.
    pub async fn read_resource(&self, uri: &str) -> Result<ResourceContents, McpErrorResponse> {
        let resource = self.store.get_resource(uri).await.map_err(|e| {
            warn!(uri, error = %e, "reading resource failed");
            store_error_response(&e)
        })?;

        let mut body = Map::new();
        body.insert("uri".into(), Value::String(resource.uri.clone()));
        body.insert("name".into(), Value::String(resource.name));
        if let Some(description) = resource.description {
            body.insert("description".into(), Value::String(description));
        }
        if let Some(metadata) = resource.metadata {
            body.insert("metadata".into(), Value::Object(metadata));
        }

        Ok(ResourceContents {
            uri: resource.uri,
            mime_type: RESOURCE_MIME_TYPE.to_string(),
            text: Value::Object(body).to_string(),
        })
    }

    /// Built-ins first, then dynamically registered tools in order.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.registry.list()
    }

    /// Resolve, validate, invoke. Every outcome is an envelope; nothing a
    /// handler does escapes as a fault.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> ToolResult {
        let Some(tool) = self.registry.resolve(name) else {
            warn!(tool = name, "unknown tool");
            return McpErrorResponse::new(
                McpErrorCode::UnknownTool,
                format!("Unknown tool: {name}"),
            )
            .into();
        };

        let arguments = arguments.unwrap_or_else(|| Value::Object(Map::new()));
        let arguments = match tool.input.validate(arguments) {
            Ok(v) => v,
            Err(failure) => {
                warn!(tool = name, violations = failure.violations.len(), "invalid tool arguments");
                return McpErrorResponse::new(
                    McpErrorCode::InvalidArguments,
                    format!("Invalid arguments for {name}: {failure}"),
                )
                .into();
            }
        };

        // Run the handler on its own task so a panic is caught as a join
        // error instead of tearing down the server loop.
        let handler = Arc::clone(&tool.handler);
        let outcome = tokio::spawn(async move { handler.call(arguments).await }).await;

        match outcome {
            Ok(Ok(value)) => ToolResult::json(&value),
            Ok(Err(e)) => {
                error!(tool = name, error = %e, "tool handler failed");
                tool_error_response(name, &e).into()
            }
            Err(join_err) => {
                error!(tool = name, error = %join_err, "tool handler panicked");
                McpErrorResponse::new(
                    McpErrorCode::ToolFailed,
                    format!("Error executing tool {name}: handler panicked"),
                )
                .into()
            }
        }
    }
}

fn store_error_response(e: &StoreError) -> McpErrorResponse {
    let code = match e {
        StoreError::ResourceNotFound(_) => McpErrorCode::ResourceMissing,
        StoreError::RecordNotFound { .. } => McpErrorCode::RecordMissing,
        StoreError::DuplicateResource(_) | StoreError::DuplicateRecord { .. } => {
            McpErrorCode::Duplicate
        }
        StoreError::InvalidResourceName(_) | StoreError::InvalidRecordId(_) => {
            McpErrorCode::InvalidArguments
        }
        StoreError::Remote(_) => McpErrorCode::RemoteError,
    };
    McpErrorResponse::new(code, e.to_string())
}

fn tool_error_response(name: &str, e: &ToolError) -> McpErrorResponse {
    let code = match e {
        ToolError::Store(inner) => store_error_response(inner).code(),
        ToolError::InvalidArguments(_) => McpErrorCode::InvalidArguments,
        ToolError::AlreadyRegistered(_) | ToolError::InvalidSchema { .. } => {
            McpErrorCode::InternalError
        }
        ToolError::Failed(_) => McpErrorCode::ToolFailed,
    };
    McpErrorResponse::new(code, format!("Error executing tool {name}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryDescriptor, Record};
    use crate::store::{MemoryStore, Resource};
    use async_trait::async_trait;
    use serde_json::json;

    fn error_of(result: &ToolResult) -> McpErrorResponse {
        assert!(result.is_error);
        serde_json::from_str(&result.content[0].text).unwrap()
    }

    fn dispatcher() -> Dispatcher {
        let store = Arc::new(MemoryStore::new("demo"));
        store
            .register_resource("Users", Some("People"), None)
            .unwrap();
        store
            .seed_records(
                "demo://users",
                ["u1", "u2", "u3"]
                    .iter()
                    .map(|id| json!({ "id": id }).as_object().unwrap().clone())
                    .collect(),
            )
            .unwrap();
        Dispatcher::new(store).unwrap()
    }

    /// A backend whose every operation fails.
    struct Broken;

    #[async_trait]
    impl DataService for Broken {
        async fn list_resources(&self) -> Result<Vec<Resource>, StoreError> {
            Err(StoreError::ResourceNotFound("backend offline".into()))
        }
        async fn get_resource(&self, uri: &str) -> Result<Resource, StoreError> {
            Err(StoreError::ResourceNotFound(uri.into()))
        }
        async fn query_resource(&self, uri: &str, _: &QueryDescriptor) -> Result<Vec<Record>, StoreError> {
            Err(StoreError::ResourceNotFound(uri.into()))
        }
        async fn get_record(&self, uri: &str, _: &str) -> Result<Record, StoreError> {
            Err(StoreError::ResourceNotFound(uri.into()))
        }
        async fn create_record(&self, uri: &str, _: Record) -> Result<Record, StoreError> {
            Err(StoreError::ResourceNotFound(uri.into()))
        }
        async fn update_record(&self, uri: &str, _: &str, _: Record) -> Result<Record, StoreError> {
            Err(StoreError::ResourceNotFound(uri.into()))
        }
        async fn delete_record(&self, uri: &str, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::ResourceNotFound(uri.into()))
        }
    }

    #[tokio::test]
    async fn list_resources_degrades_to_empty() {
        let d = Dispatcher::new(Arc::new(Broken)).unwrap();
        assert!(d.list_resources().await.is_empty());
    }

    #[tokio::test]
    async fn read_resource_returns_metadata_not_records() {
        let d = dispatcher();
        let contents = d.read_resource("demo://users").await.unwrap();
        let body: Value = serde_json::from_str(&contents.text).unwrap();
        assert_eq!(body, json!({ "uri": "demo://users", "name": "Users", "description": "People" }));

        let err = d.read_resource("demo://nope").await.unwrap_err();
        assert_eq!(err.code(), McpErrorCode::ResourceMissing);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_envelope() {
        let result = dispatcher().call_tool("drop_tables", None).await;
        let err = error_of(&result);
        assert_eq!(err.code(), McpErrorCode::UnknownTool);
        assert!(err.error.message.contains("drop_tables"));
    }

    #[tokio::test]
    async fn validation_failures_list_every_violation() {
        let result = dispatcher()
            .call_tool("list_records", Some(json!({ "sort": [{ "direction": "sideways" }] })))
            .await;
        let err = error_of(&result);
        assert_eq!(err.code(), McpErrorCode::InvalidArguments);
        for path in ["/resourceUri", "/sort/0/field", "/sort/0/direction"] {
            assert!(err.error.message.contains(path), "missing {path} in {}", err.error.message);
        }
    }

    #[tokio::test]
    async fn handler_errors_name_the_tool() {
        let result = dispatcher()
            .call_tool("delete_record", Some(json!({ "resourceUri": "demo://users", "recordId": "zz" })))
            .await;
        let err = error_of(&result);
        assert_eq!(err.code(), McpErrorCode::RecordMissing);
        assert!(err.error.message.starts_with("Error executing tool delete_record:"));
    }

    #[tokio::test]
    async fn handler_panics_are_contained() {
        let d = dispatcher();
        d.registry()
            .register_fn("explode", "panics", json!({ "type": "object" }), |_| async {
                if true {
                    panic!("boom");
                }
                Ok::<_, ToolError>(Value::Null)
            })
            .unwrap();

        let err = error_of(&d.call_tool("explode", None).await);
        assert_eq!(err.code(), McpErrorCode::ToolFailed);
        assert!(err.error.message.contains("explode"));
    }

    #[tokio::test]
    async fn list_records_filters_and_sorts() {
        let result = dispatcher()
            .call_tool(
                "list_records",
                Some(json!({
                    "resourceUri": "demo://users",
                    "sort": [{ "field": "id", "direction": "desc" }],
                    "maxRecords": 2
                })),
            )
            .await;
        assert!(!result.is_error);
        let records: Value = serde_json::from_str(&result.content[0].text).unwrap();
        let ids: Vec<&str> = records
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["u3", "u2"]);
    }
}
