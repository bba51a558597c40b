use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Expected, Result, StoreError, Version, VersionedRecord,
    store::EntityStore,
};

/// PostgreSQL-backed entity store implementation.
///
/// All records live in a single `entities` table keyed by `(kind, id)`
/// with a version column checked under a row lock on every write.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL entity store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the schema if it is not present.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                version BIGINT NOT NULL,
                record JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (kind, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entities_record ON entities USING GIN (record jsonb_path_ops)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<VersionedRecord> {
        Ok(VersionedRecord {
            id: row.try_get("id")?,
            version: Version::new(row.try_get("version")?),
            record: row.try_get("record")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl EntityStore for PostgresStore {
    async fn get(&self, kind: &str, id: &str) -> Result<Option<VersionedRecord>> {
        let row: Option<PgRow> = sqlx::query(
            "SELECT id, version, record, updated_at FROM entities WHERE kind = $1 AND id = $2",
        )
        .bind(kind)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn put(
        &self,
        kind: &str,
        id: &str,
        record: serde_json::Value,
        expected: Expected,
    ) -> Result<Version> {
        let mut tx = self.pool.begin().await?;

        let actual: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM entities WHERE kind = $1 AND id = $2 FOR UPDATE",
        )
        .bind(kind)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let actual = Version::new(actual.unwrap_or(0));
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
        sqlx::query(
            r#"
            INSERT INTO entities (kind, id, version, record, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (kind, id) DO UPDATE SET
                version = EXCLUDED.version,
                record = EXCLUDED.record,
                updated_at = EXCLUDED.updated_at
            WHERE entities.version = $6
            "#,
        )
        .bind(kind)
        .bind(id)
        .bind(next.as_i64())
        .bind(&record)
        .bind(Utc::now())
        .bind(actual.as_i64())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            // Two concurrent create-if-new writers race past the empty
            // SELECT; the primary key turns the loser into a conflict.
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                metrics::counter!("store_version_conflicts_total").increment(1);
                return StoreError::VersionConflict {
                    kind: kind.to_string(),
                    id: id.to_string(),
                    expected: expected_version,
                    actual: Version::first(),
                };
            }
            StoreError::Database(e)
        })?;

        tx.commit().await?;
        Ok(next)
    }

    async fn find_by_field(
        &self,
        kind: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<VersionedRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, version, record, updated_at
            FROM entities
            WHERE kind = $1 AND record @> jsonb_build_object($2::text, $3::jsonb)
            "#,
        )
        .bind(kind)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM entities WHERE kind = $1 AND id = $2")
            .bind(kind)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
