use async_trait::async_trait;

use crate::{Entity, Expected, Result, Version, VersionedRecord};

/// Core trait for entity store implementations.
///
/// A store persists JSON records keyed by `(kind, id)` under optimistic
/// versioning. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Retrieves a record, or None if it does not exist.
    async fn get(&self, kind: &str, id: &str) -> Result<Option<VersionedRecord>>;

    /// Writes a record, enforcing the expected version.
    ///
    /// Fails with `VersionConflict` when the stored version does not match
    /// `expected`. Returns the version the write produced.
    async fn put(
        &self,
        kind: &str,
        id: &str,
        record: serde_json::Value,
        expected: Expected,
    ) -> Result<Version>;

    /// Retrieves all records of a kind whose top-level `field` equals
    /// `value`. No ordering is guaranteed; callers sort on their own
    /// fields.
    async fn find_by_field(
        &self,
        kind: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<VersionedRecord>>;

    /// Deletes a record. Deleting a missing record is a no-op.
    async fn delete(&self, kind: &str, id: &str) -> Result<()>;
}

/// Extension trait providing typed convenience methods over [`Entity`].
#[async_trait]
pub trait EntityStoreExt: EntityStore {
    /// Loads a typed entity along with its current version.
    async fn load<E: Entity>(&self, id: &str) -> Result<Option<(E, Version)>> {
        match self.get(E::KIND, id).await? {
            Some(record) => {
                let entity = record.decode()?;
                Ok(Some((entity, record.version)))
            }
            None => Ok(None),
        }
    }

    /// Serializes and writes a typed entity.
    async fn save<E: Entity>(&self, entity: &E, expected: Expected) -> Result<Version> {
        let record = serde_json::to_value(entity)?;
        self.put(E::KIND, &entity.entity_id(), record, expected).await
    }

    /// Finds typed entities by a top-level field value.
    async fn find<E: Entity>(
        &self,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<(E, Version)>> {
        let records = self.find_by_field(E::KIND, field, value).await?;
        records
            .into_iter()
            .map(|r| {
                let version = r.version;
                Ok((r.decode()?, version))
            })
            .collect()
    }
}

// Blanket implementation for all EntityStore implementations
impl<T: EntityStore + ?Sized> EntityStoreExt for T {}
