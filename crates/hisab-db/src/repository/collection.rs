//! # Collection Repository
//!
//! One keyed collection per entity kind, stored in `local_records`.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  local_records                                                          │
//! │                                                                         │
//! │  entity    id             company_id  synced  payload (JSON)            │
//! │  ────────  ─────────────  ──────────  ──────  ────────────────────────  │
//! │  product   41             7           1       {"id":41,"sku":"ABC-1"}   │
//! │  product   1712345678901  7           0       {"id":1712345678901,...}  │
//! │  customer  41             7           1       {"id":41,"email":...}     │
//! │  device    3              NULL        1       {"id":3,"user_id":...}    │
//! │                                                                         │
//! │  PRIMARY KEY (entity, id): ids only need to be unique per kind.        │
//! │  synced = 0: created offline, never seen on the remote store.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The gateways and the reconciliation engine both go through this type, so
//! ordinary CRUD and reconciliation share one set of upsert/delete
//! primitives. Local writes never clear `synced`; only rows written from a
//! remote response, or marked after a push or match, set it.

use std::marker::PhantomData;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use hisab_core::{EntityKind, Record, TenantScope};

use crate::error::{DbError, DbResult};

/// A stored record together with its sync state.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEntry<T> {
    pub record: T,
    /// The record is known to exist on the remote store.
    pub synced: bool,
}

/// Where a write came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Local mutation; a new row is unsynced, an existing row keeps its state.
    Local,
    /// Remote response; the row is marked synced.
    Remote,
}

impl Origin {
    fn sql(self) -> &'static str {
        match self {
            Origin::Local => {
                r#"
                INSERT INTO local_records (entity, id, company_id, payload, synced, updated_at)
                VALUES (?1, ?2, ?3, ?4, 0, ?5)
                ON CONFLICT (entity, id) DO UPDATE SET
                    company_id = excluded.company_id,
                    payload    = excluded.payload,
                    updated_at = excluded.updated_at
                "#
            }
            Origin::Remote => {
                r#"
                INSERT INTO local_records (entity, id, company_id, payload, synced, updated_at)
                VALUES (?1, ?2, ?3, ?4, 1, ?5)
                ON CONFLICT (entity, id) DO UPDATE SET
                    company_id = excluded.company_id,
                    payload    = excluded.payload,
                    synced     = 1,
                    updated_at = excluded.updated_at
                "#
            }
        }
    }
}

/// Local collection of one record type.
#[derive(Debug, Clone)]
pub struct CollectionRepository<T> {
    pool: SqlitePool,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> CollectionRepository<T> {
    /// Creates a repository over the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        CollectionRepository {
            pool,
            _record: PhantomData,
        }
    }

    /// The entity kind stored in this collection.
    pub fn kind(&self) -> EntityKind {
        T::KIND
    }

    /// Every record of this kind, across all tenants.
    pub async fn get_all(&self) -> DbResult<Vec<T>> {
        self.get_scoped(TenantScope::Unscoped).await
    }

    /// Records inside a tenant scope, archived ones included.
    pub async fn get_scoped(&self, scope: TenantScope) -> DbResult<Vec<T>> {
        Ok(self
            .get_entries(scope)
            .await?
            .into_iter()
            .map(|entry| entry.record)
            .collect())
    }

    /// Records inside a tenant scope with their sync state.
    pub async fn get_entries(&self, scope: TenantScope) -> DbResult<Vec<LocalEntry<T>>> {
        let rows: Vec<(i64, String, bool)> = match scope {
            TenantScope::Company(company_id) => {
                sqlx::query_as(
                    "SELECT id, payload, synced FROM local_records \
                     WHERE entity = ?1 AND company_id = ?2 ORDER BY id",
                )
                .bind(T::KIND)
                .bind(company_id)
                .fetch_all(&self.pool)
                .await?
            }
            TenantScope::Unscoped => {
                sqlx::query_as(
                    "SELECT id, payload, synced FROM local_records WHERE entity = ?1 ORDER BY id",
                )
                .bind(T::KIND)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter()
            .map(|(id, payload, synced)| {
                Ok(LocalEntry {
                    record: decode::<T>(id, &payload)?,
                    synced,
                })
            })
            .collect()
    }

    /// Records visible in a listing for `scope`.
    pub async fn list(&self, scope: TenantScope, include_archived: bool) -> DbResult<Vec<T>> {
        let records = self.get_scoped(scope).await?;
        Ok(records
            .into_iter()
            .filter(|record| record.is_visible(scope, include_archived))
            .collect())
    }

    /// Gets a record by id.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<T>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM local_records WHERE entity = ?1 AND id = ?2")
                .bind(T::KIND)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(payload,)| decode::<T>(id, &payload)).transpose()
    }

    /// Returns true if a record with this id exists.
    pub async fn contains(&self, id: i64) -> DbResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM local_records WHERE entity = ?1 AND id = ?2")
                .bind(T::KIND)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Inserts or replaces a record after a local mutation.
    pub async fn upsert(&self, record: &T) -> DbResult<()> {
        self.write(std::slice::from_ref(record), Origin::Local).await?;
        debug!(entity = %T::KIND, id = record.id(), "Record upserted");
        Ok(())
    }

    /// Upserts a batch of local records in one transaction.
    pub async fn upsert_many(&self, records: &[T]) -> DbResult<usize> {
        self.write(records, Origin::Local).await
    }

    /// Stores a record the remote store returned.
    pub async fn cache_remote(&self, record: &T) -> DbResult<()> {
        self.write(std::slice::from_ref(record), Origin::Remote).await?;
        debug!(entity = %T::KIND, id = record.id(), "Remote record cached");
        Ok(())
    }

    /// Refreshes the local cache from a remote listing in one transaction.
    pub async fn cache_remote_many(&self, records: &[T]) -> DbResult<usize> {
        self.write(records, Origin::Remote).await
    }

    async fn write(&self, records: &[T], origin: Origin) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        for record in records {
            let payload = encode(record)?;
            sqlx::query(origin.sql())
                .bind(T::KIND)
                .bind(record.id())
                .bind(record.company_id())
                .bind(payload)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        if records.len() > 1 {
            debug!(entity = %T::KIND, count = records.len(), ?origin, "Records written");
        }
        Ok(records.len())
    }

    /// Swaps a locally created row for the copy the remote store returned.
    ///
    /// The row under `local_id` is removed and `stored` is written as synced
    /// under its remote id, in one transaction.
    pub async fn replace_with_remote(&self, local_id: i64, stored: &T) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        if local_id != stored.id() {
            sqlx::query("DELETE FROM local_records WHERE entity = ?1 AND id = ?2")
                .bind(T::KIND)
                .bind(local_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(Origin::Remote.sql())
            .bind(T::KIND)
            .bind(stored.id())
            .bind(stored.company_id())
            .bind(encode(stored)?)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(entity = %T::KIND, local_id, remote_id = stored.id(), "Local row adopted remote id");
        Ok(())
    }

    /// Marks records as known to the remote store.
    pub async fn mark_synced(&self, ids: &[i64]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut marked = 0;
        for id in ids {
            let result = sqlx::query(
                "UPDATE local_records SET synced = 1 WHERE entity = ?1 AND id = ?2 AND synced = 0",
            )
            .bind(T::KIND)
            .bind(*id)
            .execute(&mut *tx)
            .await?;
            marked += result.rows_affected();
        }
        tx.commit().await?;

        debug!(entity = %T::KIND, marked, "Records marked synced");
        Ok(marked)
    }

    /// Deletes a record by id. Returns false if there was nothing to delete.
    pub async fn delete_by_id(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM local_records WHERE entity = ?1 AND id = ?2")
            .bind(T::KIND)
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        debug!(entity = %T::KIND, id, deleted, "Record delete");
        Ok(deleted)
    }

    /// Number of records of this kind, across all tenants.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM local_records WHERE entity = ?1")
            .bind(T::KIND)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn encode<T: Record>(record: &T) -> DbResult<String> {
    serde_json::to_string(record).map_err(|e| DbError::corrupt(T::KIND.as_str(), e))
}

/// Decodes a payload; the id column is authoritative.
fn decode<T: Record>(id: i64, payload: &str) -> DbResult<T> {
    let mut record: T =
        serde_json::from_str(payload).map_err(|e| DbError::corrupt(T::KIND.as_str(), e))?;
    record.set_id(id);
    Ok(record)
}

// =============================================================================
// Unit Tests
// =============================================================================
