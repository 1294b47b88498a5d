//! Paginated-table REST backend.
//!
//! `TableApiClient` speaks the remote HTTP API; `RemoteStore` adapts it to
//! the [`DataService`] contract. Failures surface as ordinary errors and are
//! never retried here.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{DataService, Resource, StoreError};
use crate::query::{self, QueryDescriptor, Record, SortDirection, SortSpec};

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP {status}: {text}")]
    Status { status: u16, text: String },
    #[error("Failed to parse response: {0}")]
    Parse(String),
    #[error("Invalid request URL: {0}")]
    Url(String),
    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A collection (table) as listed by the remote API.
#[derive(Debug, Clone, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A record as returned by the remote API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub max_records: Option<u64>,
    pub sort: Vec<SortSpec>,
}

impl ListOptions {
    /// Query-string pairs for a list call, before any pagination offset.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(n) = self.max_records {
            pairs.push(("maxRecords".to_string(), n.to_string()));
        }
        for (i, spec) in self.sort.iter().enumerate() {
            let direction = match spec.direction {
                SortDirection::Asc => "asc",
                SortDirection::Desc => "desc",
            };
            pairs.push((format!("sort[{i}][field]"), spec.field.clone()));
            pairs.push((format!("sort[{i}][direction]"), direction.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Deserialize)]
struct CollectionsPage {
    #[serde(alias = "tables")]
    collections: Vec<Collection>,
}

#[derive(Debug, Deserialize)]
struct RecordsPage {
    records: Vec<RemoteRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeletedRecord {
    id: String,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct DeletedPage {
    records: Vec<DeletedRecord>,
}

/// HTTP client for the remote table API, authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct TableApiClient {
    base_url: String,
    token: String,
    client: Client,
}

impl TableApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    /// `{base}/{collection}/{id}` with each segment percent-encoded.
    fn record_url(&self, collection: &str, id: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| RemoteError::Url(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::Url(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push(collection)
            .push(id);
        Ok(url)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string());
            warn!(status = status.as_u16(), "remote table API returned error status");
            return Err(RemoteError::Status { status: status.as_u16(), text });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| RemoteError::Parse(e.to_string()))
    }

    pub async fn list_collections(&self) -> Result<Vec<Collection>, RemoteError> {
        let page: CollectionsPage = self.send(self.request(Method::GET, "meta/tables")).await?;
        Ok(page.collections)
    }

    pub async fn get_collection_schema(&self, collection: &str) -> Result<Value, RemoteError> {
        self.send(self.request(Method::GET, &format!("meta/tables/{collection}")))
            .await
    }

    /// List records, following `offset` pagination until exhausted or
    /// `max_records` is reached.
    pub async fn list_records(
        &self,
        collection: &str,
        options: &ListOptions,
    ) -> Result<Vec<RemoteRecord>, RemoteError> {
        let base_pairs = options.query_pairs();
        let mut out = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut pairs = base_pairs.clone();
            if let Some(o) = &offset {
                pairs.push(("offset".to_string(), o.clone()));
            }
            let page: RecordsPage = self
                .send(self.request(Method::GET, collection).query(&pairs))
                .await?;
            out.extend(page.records);

            let reached_limit = options
                .max_records
                .is_some_and(|n| out.len() as u64 >= n);
            match page.offset {
                Some(next) if !reached_limit => offset = Some(next),
                _ => break,
            }
        }

        debug!(collection, count = out.len(), "listed remote records");
        Ok(out)
    }

    pub async fn get_record(&self, collection: &str, id: &str) -> Result<RemoteRecord, RemoteError> {
        let url = self.record_url(collection, id)?;
        self.send(self.client.get(url).bearer_auth(&self.token)).await
    }

    pub async fn create_record(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<RemoteRecord, RemoteError> {
        let body = json!({ "fields": fields });
        self.send(self.request(Method::POST, collection).json(&body))
            .await
    }

    pub async fn update_records(
        &self,
        collection: &str,
        updates: Vec<(String, Map<String, Value>)>,
    ) -> Result<Vec<RemoteRecord>, RemoteError> {
        let records: Vec<Value> = updates
            .into_iter()
            .map(|(id, fields)| json!({ "id": id, "fields": fields }))
            .collect();
        let page: RecordsPage = self
            .send(
                self.request(Method::PATCH, collection)
                    .json(&json!({ "records": records })),
            )
            .await?;
        Ok(page.records)
    }

    /// Delete records by id; returns the ids the API reports as deleted.
    pub async fn delete_records(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<String>, RemoteError> {
        let pairs: Vec<(&str, &str)> = ids.iter().map(|id| ("records[]", id.as_str())).collect();
        let page: DeletedPage = self
            .send(self.request(Method::DELETE, collection).query(&pairs))
            .await?;
        Ok(page
            .records
            .into_iter()
            .filter(|r| r.deleted)
            .map(|r| r.id)
            .collect())
    }
}

/// [`DataService`] over a remote table API.
///
/// Collections become resources at `scheme://<collection id>`. Sort and
/// limit are pushed to the API; search and filter run locally.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    scheme: String,
    client: TableApiClient,
}

impl RemoteStore {
    pub fn new(scheme: impl Into<String>, client: TableApiClient) -> Self {
        Self { scheme: scheme.into(), client }
    }

    fn collection_id<'a>(&self, uri: &'a str) -> Result<&'a str, StoreError> {
        uri.strip_prefix(&self.scheme)
            .and_then(|rest| rest.strip_prefix("://"))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::ResourceNotFound(uri.to_string()))
    }

    fn to_resource(&self, c: Collection) -> Resource {
        Resource {
            uri: format!("{}://{}", self.scheme, c.id),
            name: c.name,
            description: c.description,
            metadata: None,
        }
    }

    async fn require_resource<'a>(&self, uri: &'a str) -> Result<&'a str, StoreError> {
        let id = self.collection_id(uri)?;
        self.get_resource(uri).await?;
        Ok(id)
    }
}

/// Flatten a remote record into `{id, createdAt, ...fields}`.
pub fn flatten(record: RemoteRecord) -> Record {
    let mut out = Record::new();
    out.insert("id".into(), Value::String(record.id));
    if let Some(created) = record.created_time {
        out.insert("createdAt".into(), Value::String(created));
    }
    for (k, v) in record.fields {
        out.entry(k).or_insert(v);
    }
    out
}

fn strip_managed(mut data: Record) -> Map<String, Value> {
    for key in ["id", "createdAt", "updatedAt"] {
        data.remove(key);
    }
    data
}

fn status_is_not_found(err: &RemoteError) -> bool {
    matches!(err, RemoteError::Status { status: 404, .. })
}

#[async_trait]
impl DataService for RemoteStore {
    async fn list_resources(&self) -> Result<Vec<Resource>, StoreError> {
        let collections = self.client.list_collections().await?;
        Ok(collections.into_iter().map(|c| self.to_resource(c)).collect())
    }

    async fn get_resource(&self, uri: &str) -> Result<Resource, StoreError> {
        let id = self.collection_id(uri)?;
        self.client
            .list_collections()
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .map(|c| self.to_resource(c))
            .ok_or_else(|| StoreError::ResourceNotFound(uri.to_string()))
    }

    async fn query_resource(
        &self,
        uri: &str,
        query: &QueryDescriptor,
    ) -> Result<Vec<Record>, StoreError> {
        let id = self.require_resource(uri).await?;
        let local_only = query.search_term.as_deref().is_some_and(|t| !t.is_empty())
            || query.filter.is_some();

        // Search and filter happen after the fetch, so the remote limit only
        // applies when nothing narrows the result locally.
        let options = ListOptions {
            max_records: if local_only {
                None
            } else {
                query.limit().map(|n| n as u64)
            },
            sort: query.sort.clone().unwrap_or_default(),
        };
        let records: Vec<Record> = self
            .client
            .list_records(id, &options)
            .await?
            .into_iter()
            .map(flatten)
            .collect();

        let local = QueryDescriptor { sort: None, ..query.clone() };
        Ok(query::execute(&records, &local))
    }

    async fn get_record(&self, uri: &str, id: &str) -> Result<Record, StoreError> {
        let collection = self.require_resource(uri).await?;
        match self.client.get_record(collection, id).await {
            Ok(record) => Ok(flatten(record)),
            Err(e) if status_is_not_found(&e) => Err(StoreError::RecordNotFound {
                uri: uri.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_record(&self, uri: &str, data: Record) -> Result<Record, StoreError> {
        let collection = self.require_resource(uri).await?;
        let created = self.client.create_record(collection, strip_managed(data)).await?;
        Ok(flatten(created))
    }

    async fn update_record(&self, uri: &str, id: &str, data: Record) -> Result<Record, StoreError> {
        let collection = self.require_resource(uri).await?;
        let not_found = || StoreError::RecordNotFound {
            uri: uri.to_string(),
            id: id.to_string(),
        };
        match self
            .client
            .update_records(collection, vec![(id.to_string(), strip_managed(data))])
            .await
        {
            Ok(records) => records.into_iter().next().map(flatten).ok_or_else(not_found),
            Err(e) if status_is_not_found(&e) => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_record(&self, uri: &str, id: &str) -> Result<bool, StoreError> {
        let collection = self.require_resource(uri).await?;
        match self.client.delete_records(collection, &[id.to_string()]).await {
            Ok(deleted) => Ok(deleted.iter().any(|d| d == id)),
            Err(e) if status_is_not_found(&e) => Err(StoreError::RecordNotFound {
                uri: uri.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
