use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use super::{derive_uri, DataService, Resource, StoreError};
use crate::query::{self, QueryDescriptor, Record};

const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";

#[derive(Debug, Default)]
struct Inner {
    /// Registration order.
    order: Vec<String>,
    resources: HashMap<String, Resource>,
    records: HashMap<String, Vec<Record>>,
}

/// In-memory, resource-partitioned record store.
///
/// Each operation takes the lock for a single map mutation and never holds
/// it across a suspension point. Concurrent writers race: last write wins.
#[derive(Debug)]
pub struct MemoryStore {
    scheme: String,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Register a new resource under a URI derived from `name`.
    ///
    /// A name whose derived URI is already registered is rejected.
    pub fn register_resource(
        &self,
        name: &str,
        description: Option<&str>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Resource, StoreError> {
        let uri = derive_uri(&self.scheme, name)?;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.resources.contains_key(&uri) {
            return Err(StoreError::DuplicateResource(uri));
        }

        let resource = Resource {
            uri: uri.clone(),
            name: name.to_string(),
            description: description.map(str::to_string),
            metadata,
        };
        inner.order.push(uri.clone());
        inner.resources.insert(uri.clone(), resource.clone());
        inner.records.insert(uri.clone(), Vec::new());
        debug!(uri = %uri, "registered resource");
        Ok(resource)
    }

    /// Insert each record with `create_record` semantics.
    ///
    /// The batch is all-or-nothing: every id is checked against the stored
    /// records and the rest of the batch before any record is inserted.
    pub fn seed_records(&self, uri: &str, records: Vec<Record>) -> Result<usize, StoreError> {
        let batch = records
            .into_iter()
            .map(stamp)
            .collect::<Result<Vec<_>, _>>()?;
        let count = batch.len();
        self.insert_all(uri, batch)?;
        Ok(count)
    }

    fn insert(&self, uri: &str, data: Record) -> Result<Record, StoreError> {
        let record = stamp(data)?;
        self.insert_all(uri, vec![record.clone()])?;
        Ok(record)
    }

    fn insert_all(&self, uri: &str, batch: Vec<Record>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let records = inner
            .records
            .get_mut(uri)
            .ok_or_else(|| StoreError::ResourceNotFound(uri.to_string()))?;

        for (i, record) in batch.iter().enumerate() {
            let id = record.get("id").and_then(Value::as_str).unwrap_or_default();
            if records.iter().chain(&batch[..i]).any(|r| has_id(r, id)) {
                return Err(StoreError::DuplicateRecord {
                    uri: uri.to_string(),
                    id: id.to_string(),
                });
            }
        }
        records.extend(batch);
        Ok(())
    }
}

#[async_trait]
impl DataService for MemoryStore {
    async fn list_resources(&self) -> Result<Vec<Resource>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .order
            .iter()
            .filter_map(|uri| inner.resources.get(uri).cloned())
            .collect())
    }

    async fn get_resource(&self, uri: &str) -> Result<Resource, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .resources
            .get(uri)
            .cloned()
            .ok_or_else(|| StoreError::ResourceNotFound(uri.to_string()))
    }

    async fn query_resource(
        &self,
        uri: &str,
        query: &QueryDescriptor,
    ) -> Result<Vec<Record>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let records = inner
            .records
            .get(uri)
            .ok_or_else(|| StoreError::ResourceNotFound(uri.to_string()))?;
        Ok(query::execute(records, query))
    }

    async fn get_record(&self, uri: &str, id: &str) -> Result<Record, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let records = inner
            .records
            .get(uri)
            .ok_or_else(|| StoreError::ResourceNotFound(uri.to_string()))?;
        records
            .iter()
            .find(|r| has_id(r, id))
            .cloned()
            .ok_or_else(|| record_not_found(uri, id))
    }

    async fn create_record(&self, uri: &str, data: Record) -> Result<Record, StoreError> {
        self.insert(uri, data)
    }

    async fn update_record(&self, uri: &str, id: &str, data: Record) -> Result<Record, StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let records = inner
            .records
            .get_mut(uri)
            .ok_or_else(|| StoreError::ResourceNotFound(uri.to_string()))?;
        let existing = records
            .iter_mut()
            .find(|r| has_id(r, id))
            .ok_or_else(|| record_not_found(uri, id))?;

        let created_at = existing.get(CREATED_AT).cloned();
        for (key, value) in data {
            existing.insert(key, value);
        }
        existing.insert("id".into(), Value::String(id.to_string()));
        match created_at {
            Some(v) => existing.insert(CREATED_AT.into(), v),
            None => existing.remove(CREATED_AT),
        };
        existing.insert(UPDATED_AT.into(), Value::String(timestamp()));
        Ok(existing.clone())
    }

    async fn delete_record(&self, uri: &str, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let records = inner
            .records
            .get_mut(uri)
            .ok_or_else(|| StoreError::ResourceNotFound(uri.to_string()))?;
        let index = records
            .iter()
            .position(|r| has_id(r, id))
            .ok_or_else(|| record_not_found(uri, id))?;
        records.remove(index);
        Ok(true)
    }
}

/// Assign the id (generated when absent) and both timestamps.
fn stamp(mut data: Record) -> Result<Record, StoreError> {
    let id = match data.get("id") {
        None | Some(Value::Null) => uuid::Uuid::new_v4().to_string(),
        Some(value) => record_id(value)?,
    };
    let now = timestamp();
    data.insert("id".into(), Value::String(id));
    data.insert(CREATED_AT.into(), Value::String(now.clone()));
    data.insert(UPDATED_AT.into(), Value::String(now));
    Ok(data)
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn has_id(record: &Record, id: &str) -> bool {
    record.get("id").and_then(Value::as_str) == Some(id)
}

fn record_id(value: &Value) -> Result<String, StoreError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(StoreError::InvalidRecordId(other.clone())),
    }
}

fn record_not_found(uri: &str, id: &str) -> StoreError {
    StoreError::RecordNotFound {
        uri: uri.to_string(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortSpec;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn store_with_users() -> MemoryStore {
        let store = MemoryStore::new("demo");
        store.register_resource("Users", Some("People"), None).unwrap();
        store
            .seed_records(
                "demo://users",
                vec![
                    record(json!({ "id": "u1", "role": "admin" })),
                    record(json!({ "id": "u2", "role": "user" })),
                    record(json!({ "id": "u3", "role": "user" })),
                ],
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn resources_list_in_registration_order() {
        let store = MemoryStore::new("demo");
        store.register_resource("Zebras", None, None).unwrap();
        store.register_resource("Apples", None, None).unwrap();

        let uris: Vec<String> = store
            .list_resources()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.uri)
            .collect();
        assert_eq!(uris, vec!["demo://zebras", "demo://apples"]);
    }

    #[tokio::test]
    async fn duplicate_resource_is_rejected() {
        let store = MemoryStore::new("demo");
        store.register_resource("Users", Some("first"), None).unwrap();
        let err = store.register_resource("users", Some("second"), None).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateResource(ref uri) if uri == "demo://users"));

        let resource = store.get_resource("demo://users").await.unwrap();
        assert_eq!(resource.description.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found_everywhere() {
        let store = MemoryStore::new("demo");
        let q = QueryDescriptor::default();
        assert!(matches!(store.get_resource("demo://x").await, Err(StoreError::ResourceNotFound(_))));
        assert!(matches!(store.query_resource("demo://x", &q).await, Err(StoreError::ResourceNotFound(_))));
        assert!(matches!(
            store.create_record("demo://x", Record::new()).await,
            Err(StoreError::ResourceNotFound(_))
        ));
        assert!(matches!(
            store.delete_record("demo://x", "a").await,
            Err(StoreError::ResourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_assigns_unique_ids_and_equal_timestamps() {
        let store = MemoryStore::new("demo");
        store.register_resource("Notes", None, None).unwrap();

        let a = store
            .create_record("demo://notes", record(json!({ "text": "a" })))
            .await
            .unwrap();
        let b = store
            .create_record("demo://notes", record(json!({ "text": "b" })))
            .await
            .unwrap();

        assert_ne!(a["id"], b["id"]);
        assert_eq!(a[CREATED_AT], a[UPDATED_AT]);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_and_malformed_ids() {
        let store = store_with_users();
        let err = store
            .create_record("demo://users", record(json!({ "id": "u1" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRecord { .. }));

        let err = store
            .create_record("demo://users", record(json!({ "id": ["x"] })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecordId(_)));

        let created = store
            .create_record("demo://users", record(json!({ "id": 42 })))
            .await
            .unwrap();
        assert_eq!(created["id"], "42");
    }

    #[tokio::test]
    async fn update_merges_and_preserves_identity() {
        let store = store_with_users();
        let before = store.get_record("demo://users", "u2").await.unwrap();

        let updated = store
            .update_record(
                "demo://users",
                "u2",
                record(json!({ "id": "hijack", "role": "admin", "createdAt": "1970", "email": "u2@x" })),
            )
            .await
            .unwrap();

        assert_eq!(updated["id"], "u2");
        assert_eq!(updated["role"], "admin");
        assert_eq!(updated["email"], "u2@x");
        assert_eq!(updated[CREATED_AT], before[CREATED_AT]);
        assert!(store.get_record("demo://users", "hijack").await.is_err());
    }

    #[tokio::test]
    async fn update_missing_record_leaves_store_unchanged() {
        let store = store_with_users();
        let q = QueryDescriptor::default();
        let before = store.query_resource("demo://users", &q).await.unwrap();

        let err = store
            .update_record("demo://users", "nope", record(json!({ "role": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
        assert_eq!(store.query_resource("demo://users", &q).await.unwrap(), before);
    }

    #[tokio::test]
    async fn seeding_a_batch_with_a_duplicate_inserts_nothing() {
        let store = store_with_users();
        let q = QueryDescriptor::default();

        let err = store
            .seed_records(
                "demo://users",
                vec![record(json!({ "id": "u4" })), record(json!({ "id": "u1" }))],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRecord { ref id, .. } if id == "u1"));

        let err = store
            .seed_records(
                "demo://users",
                vec![record(json!({ "id": "u5" })), record(json!({ "id": "u5" }))],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRecord { ref id, .. } if id == "u5"));

        assert_eq!(store.query_resource("demo://users", &q).await.unwrap().len(), 3);
        assert!(store.get_record("demo://users", "u4").await.is_err());
    }

    #[tokio::test]
    async fn delete_twice_fails_the_second_time() {
        let store = store_with_users();
        assert!(store.delete_record("demo://users", "u1").await.unwrap());
        let err = store.delete_record("demo://users", "u1").await.unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn query_delegates_to_engine() {
        let store = store_with_users();
        let mut filter = Map::new();
        filter.insert("role".into(), json!("user"));
        let query = QueryDescriptor {
            filter: Some(filter),
            sort: Some(vec![SortSpec::desc("id")]),
            ..Default::default()
        };

        let out = store.query_resource("demo://users", &query).await.unwrap();
        let ids: Vec<&str> = out.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["u3", "u2"]);
    }
}
