use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Expected, Result, StoreError, Version, VersionedRecord,
    store::EntityStore,
};

/// In-memory entity store implementation for testing.
///
/// Stores all records behind a single lock and provides the same
/// versioning semantics as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<HashMap<(String, String), VersionedRecord>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn get(&self, kind: &str, id: &str) -> Result<Option<VersionedRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&(kind.to_string(), id.to_string())).cloned())
    }

    async fn put(
        &self,
        kind: &str,
        id: &str,
        record: serde_json::Value,
        expected: Expected,
    ) -> Result<Version> {
        let mut records = self.records.write().await;
        let key = (kind.to_string(), id.to_string());

        let actual = records
            .get(&key)
            .map(|r| r.version)
            .unwrap_or(Version::initial());

        let expected_version = match expected {
            Expected::New => Version::initial(),
            Expected::Version(v) => v,
            Expected::Any => actual,
        };
        if actual != expected_version {
            metrics::counter!("store_version_conflicts_total").increment(1);
            return Err(StoreError::VersionConflict {
                kind: kind.to_string(),
                id: id.to_string(),
                expected: expected_version,
                actual,
            });
        }

        let next = actual.next();
        records.insert(
            key,
            VersionedRecord {
                id: id.to_string(),
                version: next,
                record,
                updated_at: Utc::now(),
            },
        );
        Ok(next)
    }

    async fn find_by_field(
        &self,
        kind: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<VersionedRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|((k, _), r)| k == kind && r.record.get(field) == Some(value))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<()> {
        let mut records = self.records.write().await;
        records.remove(&(kind.to_string(), id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_new_then_get() {
        let store = InMemoryStore::new();
        let version = store
            .put("invoice", "a", json!({"status": "PENDING"}), Expected::New)
            .await
            .unwrap();
        assert_eq!(version, Version::first());

        let record = store.get("invoice", "a").await.unwrap().unwrap();
        assert_eq!(record.version, Version::first());
        assert_eq!(record.record["status"], "PENDING");
    }

    #[tokio::test]
    async fn put_new_fails_when_record_exists() {
        let store = InMemoryStore::new();
        store
            .put("invoice", "a", json!({}), Expected::New)
            .await
            .unwrap();

        let result = store.put("invoice", "a", json!({}), Expected::New).await;
        assert!(matches!(
            result,
            Err(StoreError::VersionConflict { actual, .. }) if actual == Version::first()
        ));
    }

    #[tokio::test]
    async fn put_with_expected_version() {
        let store = InMemoryStore::new();
        let v1 = store
            .put("invoice", "a", json!({"n": 1}), Expected::New)
            .await
            .unwrap();

        let v2 = store
            .put("invoice", "a", json!({"n": 2}), Expected::Version(v1))
            .await
            .unwrap();
        assert_eq!(v2, v1.next());

        // Stale writer loses
        let result = store
            .put("invoice", "a", json!({"n": 3}), Expected::Version(v1))
            .await;
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn put_any_overwrites() {
        let store = InMemoryStore::new();
        store
            .put("invoice", "a", json!({"n": 1}), Expected::New)
            .await
            .unwrap();
        let version = store
            .put("invoice", "a", json!({"n": 2}), Expected::Any)
            .await
            .unwrap();
        assert_eq!(version.as_i64(), 2);
    }

    #[tokio::test]
    async fn kinds_are_isolated() {
        let store = InMemoryStore::new();
        store
            .put("invoice", "a", json!({"n": 1}), Expected::New)
            .await
            .unwrap();

        assert!(store.get("payment", "a").await.unwrap().is_none());
        // Same id under a different kind is a fresh record
        store
            .put("payment", "a", json!({"n": 2}), Expected::New)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn find_by_field_matches_top_level_values() {
        let store = InMemoryStore::new();
        store
            .put("payment", "p1", json!({"invoice_id": "i1", "status": "SUCCESS"}), Expected::New)
            .await
            .unwrap();
        store
            .put("payment", "p2", json!({"invoice_id": "i1", "status": "FAILED"}), Expected::New)
            .await
            .unwrap();
        store
            .put("payment", "p3", json!({"invoice_id": "i2", "status": "SUCCESS"}), Expected::New)
            .await
            .unwrap();

        let for_i1 = store
            .find_by_field("payment", "invoice_id", &json!("i1"))
            .await
            .unwrap();
        assert_eq!(for_i1.len(), 2);

        let none = store
            .find_by_field("payment", "invoice_id", &json!("i9"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryStore::new();
        store
            .put("conversation", "owner", json!({}), Expected::New)
            .await
            .unwrap();

        store.delete("conversation", "owner").await.unwrap();
        assert!(store.get("conversation", "owner").await.unwrap().is_none());
        store.delete("conversation", "owner").await.unwrap();
    }

    #[tokio::test]
    async fn delete_then_put_new_restarts_versioning() {
        let store = InMemoryStore::new();
        store
            .put("conversation", "owner", json!({"n": 1}), Expected::New)
            .await
            .unwrap();
        store.delete("conversation", "owner").await.unwrap();

        let version = store
            .put("conversation", "owner", json!({"n": 2}), Expected::New)
            .await
            .unwrap();
        assert_eq!(version, Version::first());
    }
}
