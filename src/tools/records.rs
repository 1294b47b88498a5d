//! Built-in record tools: thin validate-then-delegate wrappers over a
//! [`DataService`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};

use super::{ToolError, ToolRegistry};
use crate::query::{QueryDescriptor, Record, SortSpec};
use crate::store::DataService;

/// Names of the built-in tools, in listing order.
pub const BUILTIN_TOOLS: [&str; 6] = [
    "list_records",
    "search_records",
    "get_record",
    "create_record",
    "update_record",
    "delete_record",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecordsParams {
    pub resource_uri: String,
    #[serde(default)]
    pub filter: Option<Map<String, Value>>,
    #[serde(default)]
    pub sort: Option<Vec<SortSpec>>,
    #[serde(default, deserialize_with = "whole_number")]
    pub max_records: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRecordsParams {
    pub resource_uri: String,
    pub search_term: String,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default, deserialize_with = "whole_number")]
    pub max_records: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRefParams {
    pub resource_uri: String,
    pub record_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordParams {
    pub resource_uri: String,
    pub data: Record,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordParams {
    pub resource_uri: String,
    pub record_id: String,
    pub data: Record,
}

/// Accepts every number the `integer` schema type admits, including `2.0`.
pub(crate) fn whole_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(n) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    n.as_i64()
        .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a whole number, found {n}")))
}

pub(crate) fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn resource_uri_prop() -> Value {
    json!({
        "type": "string",
        "minLength": 1,
        "description": "URI of the resource, e.g. demo://users"
    })
}

fn record_id_prop() -> Value {
    json!({ "type": "string", "minLength": 1, "description": "Id of the record" })
}

fn max_records_prop() -> Value {
    json!({
        "type": "integer",
        "description": "Maximum number of records to return; zero or negative means unlimited"
    })
}

fn data_prop(description: &str) -> Value {
    json!({ "type": "object", "description": description })
}

/// Register the six built-in tools against `store`.
pub fn register_builtins(
    registry: &ToolRegistry,
    store: Arc<dyn DataService>,
) -> Result<(), ToolError> {
    let s = Arc::clone(&store);
    registry.register_fn(
        "list_records",
        "List records from a resource with optional exact-match filter, sort and limit",
        json!({
            "type": "object",
            "required": ["resourceUri"],
            "properties": {
                "resourceUri": resource_uri_prop(),
                "filter": {
                    "type": "object",
                    "description": "Field/value pairs that must match exactly"
                },
                "sort": {
                    "type": "array",
                    "description": "Sort keys applied in order",
                    "items": {
                        "type": "object",
                        "required": ["field"],
                        "properties": {
                            "field": { "type": "string", "description": "Field to sort by" },
                            "direction": {
                                "type": "string",
                                "enum": ["asc", "desc"],
                                "default": "asc",
                                "description": "Sort direction"
                            }
                        }
                    }
                },
                "maxRecords": max_records_prop()
            }
        }),
        move |args| {
            let store = Arc::clone(&s);
            async move {
                let p: ListRecordsParams = parse(args)?;
                let query = QueryDescriptor {
                    filter: p.filter,
                    sort: p.sort,
                    max_records: p.max_records,
                    ..Default::default()
                };
                let records = store.query_resource(&p.resource_uri, &query).await?;
                Ok::<_, ToolError>(Value::Array(records.into_iter().map(Value::Object).collect()))
            }
        },
    )?;

    let s = Arc::clone(&store);
    registry.register_fn(
        "search_records",
        "Case-insensitive substring search across record fields",
        json!({
            "type": "object",
            "required": ["resourceUri", "searchTerm"],
            "properties": {
                "resourceUri": resource_uri_prop(),
                "searchTerm": { "type": "string", "description": "Text to look for" },
                "fields": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Only search these fields; all fields when omitted"
                },
                "maxRecords": max_records_prop()
            }
        }),
        move |args| {
            let store = Arc::clone(&s);
            async move {
                let p: SearchRecordsParams = parse(args)?;
                let query = QueryDescriptor {
                    search_term: Some(p.search_term),
                    fields: p.fields,
                    max_records: p.max_records,
                    ..Default::default()
                };
                let records = store.query_resource(&p.resource_uri, &query).await?;
                Ok::<_, ToolError>(Value::Array(records.into_iter().map(Value::Object).collect()))
            }
        },
    )?;

    let s = Arc::clone(&store);
    registry.register_fn(
        "get_record",
        "Fetch a single record by id",
        json!({
            "type": "object",
            "required": ["resourceUri", "recordId"],
            "properties": {
                "resourceUri": resource_uri_prop(),
                "recordId": record_id_prop()
            }
        }),
        move |args| {
            let store = Arc::clone(&s);
            async move {
                let p: RecordRefParams = parse(args)?;
                let record = store.get_record(&p.resource_uri, &p.record_id).await?;
                Ok::<_, ToolError>(Value::Object(record))
            }
        },
    )?;

    let s = Arc::clone(&store);
    registry.register_fn(
        "create_record",
        "Create a record; an id is generated when data has none",
        json!({
            "type": "object",
            "required": ["resourceUri", "data"],
            "properties": {
                "resourceUri": resource_uri_prop(),
                "data": data_prop("Field values for the new record")
            }
        }),
        move |args| {
            let store = Arc::clone(&s);
            async move {
                let p: CreateRecordParams = parse(args)?;
                let record = store.create_record(&p.resource_uri, p.data).await?;
                Ok::<_, ToolError>(Value::Object(record))
            }
        },
    )?;

    let s = Arc::clone(&store);
    registry.register_fn(
        "update_record",
        "Merge fields into an existing record",
        json!({
            "type": "object",
            "required": ["resourceUri", "recordId", "data"],
            "properties": {
                "resourceUri": resource_uri_prop(),
                "recordId": record_id_prop(),
                "data": data_prop("Fields to merge; id and createdAt are ignored")
            }
        }),
        move |args| {
            let store = Arc::clone(&s);
            async move {
                let p: UpdateRecordParams = parse(args)?;
                let record = store
                    .update_record(&p.resource_uri, &p.record_id, p.data)
                    .await?;
                Ok::<_, ToolError>(Value::Object(record))
            }
        },
    )?;

    let s = store;
    registry.register_fn(
        "delete_record",
        "Delete a record by id",
        json!({
            "type": "object",
            "required": ["resourceUri", "recordId"],
            "properties": {
                "resourceUri": resource_uri_prop(),
                "recordId": record_id_prop()
            }
        }),
        move |args| {
            let store = Arc::clone(&s);
            async move {
                let p: RecordRefParams = parse(args)?;
                let deleted = store.delete_record(&p.resource_uri, &p.record_id).await?;
                Ok::<_, ToolError>(json!({ "deleted": deleted }))
            }
        },
    )?;

    Ok(())
}
