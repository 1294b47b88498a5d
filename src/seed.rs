//! Startup data: seed files and the built-in demo resources and tools.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::query::{QueryDescriptor, Record, SortSpec};
use crate::store::{derive_uri, DataService, MemoryStore, StoreError};
use crate::tools::records::{parse, whole_number};
use crate::tools::{ToolError, ToolRegistry};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Cannot read seed file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid seed file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One resource and its initial records.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedResource {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub records: Vec<Record>,
}

/// Register each resource and insert its records. Returns the record count.
pub fn apply(store: &MemoryStore, resources: Vec<SeedResource>) -> Result<usize, SeedError> {
    let mut total = 0;
    for seed in resources {
        let resource =
            store.register_resource(&seed.name, seed.description.as_deref(), seed.metadata)?;
        total += store.seed_records(&resource.uri, seed.records)?;
    }
    Ok(total)
}

/// Load a JSON array of [`SeedResource`] from `path` into `store`.
pub fn load_file(store: &MemoryStore, path: &Path) -> Result<usize, SeedError> {
    let shown = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: shown.clone(),
        source,
    })?;
    let resources: Vec<SeedResource> =
        serde_json::from_str(&text).map_err(|source| SeedError::Parse {
            path: shown.clone(),
            source,
        })?;
    let count = apply(store, resources)?;
    info!(path = %shown, records = count, "loaded seed file");
    Ok(count)
}

fn records(value: Value) -> Vec<Record> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// The demo `Users` and `Books` resources.
pub fn demo_resources() -> Vec<SeedResource> {
    vec![
        SeedResource {
            name: "Users".into(),
            description: Some("Demo user accounts".into()),
            metadata: None,
            records: records(json!([
                { "id": "u1", "name": "Jane Smith", "email": "jane@example.com", "role": "admin" },
                { "id": "u2", "name": "John Doe", "email": "john@example.com", "role": "user" },
                { "id": "u3", "name": "Alex Kim", "email": "alex@example.com", "role": "user" }
            ])),
        },
        SeedResource {
            name: "Books".into(),
            description: Some("Demo book catalogue".into()),
            metadata: Some(
                json!({ "source": "demo" })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            ),
            records: records(json!([
                { "id": "b1", "title": "The Left Hand of Darkness", "author": "Ursula K. Le Guin", "year": 1969 },
                { "id": "b2", "title": "A Wizard of Earthsea", "author": "Ursula K. Le Guin", "year": 1968 },
                { "id": "b3", "title": "Dune", "author": "Frank Herbert", "year": 1965 },
                { "id": "b4", "title": "The Dispossessed", "author": "Ursula K. Le Guin", "year": 1974 }
            ])),
        },
    ]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindBooksParams {
    author: String,
    #[serde(default, deserialize_with = "whole_number")]
    max_records: Option<i64>,
}

/// Register `find_books_by_author` against the demo `Books` resource.
pub fn register_demo_tools(
    registry: &ToolRegistry,
    store: Arc<dyn DataService>,
    scheme: &str,
) -> Result<(), ToolError> {
    let books_uri = derive_uri(scheme, "Books")?;
    registry.register_fn(
        "find_books_by_author",
        "Find books whose author matches exactly, oldest first",
        json!({
            "type": "object",
            "required": ["author"],
            "properties": {
                "author": { "type": "string", "minLength": 1, "description": "Exact author name" },
                "maxRecords": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 100,
                    "default": 10,
                    "description": "Maximum number of books to return"
                }
            }
        }),
        move |args| {
            let store = Arc::clone(&store);
            let uri = books_uri.clone();
            async move {
                let p: FindBooksParams = parse(args)?;
                let mut filter = Map::new();
                filter.insert("author".into(), Value::String(p.author));
                let query = QueryDescriptor {
                    filter: Some(filter),
                    sort: Some(vec![SortSpec::asc("year")]),
                    max_records: p.max_records,
                    ..Default::default()
                };
                let books = store.query_resource(&uri, &query).await?;
                Ok::<_, ToolError>(Value::Array(books.into_iter().map(Value::Object).collect()))
            }
        },
    )
}
