//! The data service contract consumed by the dispatcher, plus its backends.

pub mod memory;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::{QueryDescriptor, Record};

pub use memory::MemoryStore;
pub use remote::{RemoteStore, TableApiClient};

/// Content type advertised for every resource.
pub const RESOURCE_MIME_TYPE: &str = "application/json";

/// A named, URI-addressed collection of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
    #[error("Record not found: {id} in {uri}")]
    RecordNotFound { uri: String, id: String },
    #[error("Resource already registered: {0}")]
    DuplicateResource(String),
    #[error("Record already exists: {id} in {uri}")]
    DuplicateRecord { uri: String, id: String },
    #[error("Resource name does not produce a usable URI: {0:?}")]
    InvalidResourceName(String),
    #[error("Record id must be a string or number, found {0}")]
    InvalidRecordId(Value),
    #[error("Remote backend error: {0}")]
    Remote(#[from] remote::RemoteError),
}

/// Backend contract for resource discovery and record access.
///
/// Every operation may suspend; the reference backend never does.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn list_resources(&self) -> Result<Vec<Resource>, StoreError>;

    async fn get_resource(&self, uri: &str) -> Result<Resource, StoreError>;

    async fn query_resource(
        &self,
        uri: &str,
        query: &QueryDescriptor,
    ) -> Result<Vec<Record>, StoreError>;

    async fn get_record(&self, uri: &str, id: &str) -> Result<Record, StoreError>;

    async fn create_record(&self, uri: &str, data: Record) -> Result<Record, StoreError>;

    async fn update_record(&self, uri: &str, id: &str, data: Record) -> Result<Record, StoreError>;

    async fn delete_record(&self, uri: &str, id: &str) -> Result<bool, StoreError>;
}

/// Derive `scheme://slug` from a display name.
///
/// The slug is the lowercased name with every run of non-alphanumeric
/// characters collapsed to a single `-`, trimmed at both ends.
pub fn derive_uri(scheme: &str, name: &str) -> Result<String, StoreError> {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        return Err(StoreError::InvalidResourceName(name.to_string()));
    }
    Ok(format!("{scheme}://{slug}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_uri_collapses_separator_runs() {
        assert_eq!(derive_uri("demo", "Users").unwrap(), "demo://users");
        assert_eq!(
            derive_uri("demo", "  Order Items -- 2024!").unwrap(),
            "demo://order-items-2024"
        );
    }

    #[test]
    fn derive_uri_rejects_names_without_alphanumerics() {
        assert!(matches!(
            derive_uri("demo", "!!!"),
            Err(StoreError::InvalidResourceName(_))
        ));
    }
}
