//! Ordered registry of named, schema-described tools.
//!
//! Names are unique: registering a name that is already taken fails, so a
//! dynamically added tool can never shadow a built-in. Listing and lookup
//! both follow registration order.

pub mod records;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::schema::InputSchema;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool already registered: {0}")]
    AlreadyRegistered(String),
    #[error("Invalid input schema for {name}: {reason}")]
    InvalidSchema { name: String, reason: String },
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Failed(String),
}

/// Advertised shape of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Executes a tool with arguments that already passed schema validation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        (self.0)(arguments).await
    }
}

pub struct RegisteredTool {
    pub definition: ToolDefinition,
    /// Compiled form of `definition.input_schema`.
    pub input: InputSchema,
    pub handler: Arc<dyn ToolHandler>,
}

#[derive(Default)]
struct Inner {
    tools: Vec<Arc<RegisteredTool>>,
    by_name: HashMap<String, usize>,
}

#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<Inner>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. The schema must be a compilable JSON object schema;
    /// it is compiled here and reused for every call.
    pub fn register(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), ToolError> {
        let name = name.into();

        if input_schema.get("type").and_then(Value::as_str) != Some("object") {
            return Err(ToolError::InvalidSchema {
                name,
                reason: "top-level type must be \"object\"".into(),
            });
        }
        let input = match InputSchema::compile(input_schema) {
            Ok(input) => input,
            Err(e) => return Err(ToolError::InvalidSchema { name, reason: e.to_string() }),
        };

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.by_name.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }

        debug!(tool = %name, "registering tool");
        let index = inner.tools.len();
        inner.by_name.insert(name.clone(), index);
        inner.tools.push(Arc::new(RegisteredTool {
            definition: ToolDefinition {
                name,
                description: description.into(),
                input_schema: input.as_value().clone(),
            },
            input,
            handler,
        }));
        Ok(())
    }

    /// Register an async closure as a tool.
    pub fn register_fn<F, Fut>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Result<(), ToolError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.register(name, description, input_schema, Arc::new(FnHandler(handler)))
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<RegisteredTool>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_name.get(name).map(|&i| Arc::clone(&inner.tools[i]))
    }

    /// Definitions in registration order.
    pub fn list(&self) -> Vec<ToolDefinition> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
