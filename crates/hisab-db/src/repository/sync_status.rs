//! # Sync Status Repository
//!
//! Persists the singleton `SyncStatus` row so "last synced" survives restarts.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  load()   row missing? ──► default "never" status (nothing written)     │
//! │  save()   INSERT ... ON CONFLICT (id) DO UPDATE   (id is always 1)      │
//! │                                                                         │
//! │  The row is never deleted.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use hisab_core::{LastSyncStatus, SyncStatus};

use crate::error::DbResult;

/// Repository for the persisted sync status.
#[derive(Debug, Clone)]
pub struct SyncStatusRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SyncStatusRow {
    last_sync_time: Option<DateTime<Utc>>,
    last_sync_status: LastSyncStatus,
    pending_records: i64,
    is_syncing: bool,
}

impl SyncStatusRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncStatusRepository { pool }
    }

    /// Loads the stored status, or the "never synced" default.
    ///
    /// `is_online` is not persisted; it is always reported as false here.
    pub async fn load(&self) -> DbResult<SyncStatus> {
        let row: Option<SyncStatusRow> = sqlx::query_as(
            "SELECT last_sync_time, last_sync_status, pending_records, is_syncing \
             FROM sync_status WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|row| SyncStatus {
                last_sync_time: row.last_sync_time,
                last_sync_status: row.last_sync_status,
                pending_records: row.pending_records,
                is_syncing: row.is_syncing,
                is_online: false,
            })
            .unwrap_or_default())
    }

    /// Writes the status row.
    pub async fn save(&self, status: &SyncStatus) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (id, last_sync_time, last_sync_status, pending_records, is_syncing)
            VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                last_sync_time   = excluded.last_sync_time,
                last_sync_status = excluded.last_sync_status,
                pending_records  = excluded.pending_records,
                is_syncing       = excluded.is_syncing
            "#,
        )
        .bind(status.last_sync_time)
        .bind(status.last_sync_status)
        .bind(status.pending_records)
        .bind(status.is_syncing)
        .execute(&self.pool)
        .await?;

        debug!(
            last_sync_status = ?status.last_sync_status,
            is_syncing = status.is_syncing,
            "Sync status saved"
        );
        Ok(())
    }
}
