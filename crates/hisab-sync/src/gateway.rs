//! # Entity Gateway
//!
//! Local-first CRUD for one record type, with best-effort remote
//! propagation. One generic gateway replaces a hand-written service per
//! entity kind.
//!
//! ## Operation Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  READS  (get_all, get_by_id)                                           │
//! │  ─────                                                                 │
//! │  reachable? ──yes──► remote ──ok──► refresh local cache ──► return     │
//! │      │                  │                                               │
//! │      no                 err (warn!)                                     │
//! │      ▼                  ▼                                               │
//! │  local store, filtered by scope and archive state ──► return           │
//! │                                                                         │
//! │  CREATE                                                                │
//! │  ──────                                                                │
//! │  reachable? ──yes──► remote.create ──ok──► cache as synced (remote id) │
//! │      │                   │                                              │
//! │      no                  err (warn!)                                    │
//! │      ▼                   ▼                                              │
//! │  synthesize id from the clock ──► local upsert only                    │
//! │  (picked up by the next reconciliation pass)                           │
//! │                                                                         │
//! │  UPDATE   local write-through FIRST, then remote.update (best effort)  │
//! │  DELETE   local delete FIRST; on success, remote.delete (best effort)  │
//! │                                                                         │
//! │  Local errors always reach the caller. Remote errors never do.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, warn};

use hisab_core::{apply_patch, Record, TenantScope};
use hisab_db::CollectionRepository;

use crate::error::SyncResult;
use crate::reachability::Reachability;
use crate::remote::RemoteStore;

/// Local-first gateway for one record type.
pub struct EntityGateway<T: Record> {
    pub(crate) local: CollectionRepository<T>,
    pub(crate) remote: Arc<dyn RemoteStore<T>>,
    pub(crate) reachability: Reachability,
}

impl<T: Record> Clone for EntityGateway<T> {
    fn clone(&self) -> Self {
        EntityGateway {
            local: self.local.clone(),
            remote: Arc::clone(&self.remote),
            reachability: self.reachability.clone(),
        }
    }
}

impl<T: Record> EntityGateway<T> {
    pub fn new(
        local: CollectionRepository<T>,
        remote: Arc<dyn RemoteStore<T>>,
        reachability: Reachability,
    ) -> Self {
        EntityGateway {
            local,
            remote,
            reachability,
        }
    }

    /// Lists records for `scope`.
    ///
    /// Never fails because of the remote store; only a local store failure
    /// during fallback is returned.
    pub async fn get_all(&self, include_archived: bool, scope: TenantScope) -> SyncResult<Vec<T>> {
        if self.reachability.is_reachable() {
            match self.remote.list(scope, include_archived).await {
                Ok(records) => {
                    if let Err(e) = self.local.cache_remote_many(&records).await {
                        warn!(entity = %T::KIND, error = %e, "Failed to refresh local cache");
                    }
                    return Ok(records);
                }
                Err(e) => {
                    warn!(entity = %T::KIND, %scope, error = %e, "Remote list failed, serving local store");
                }
            }
        }

        Ok(self.local.list(scope, include_archived).await?)
    }

    /// Gets one record, remote first when reachable.
    pub async fn get_by_id(&self, id: i64) -> SyncResult<Option<T>> {
        if self.reachability.is_reachable() {
            match self.remote.get(id).await {
                Ok(Some(record)) => {
                    if let Err(e) = self.local.cache_remote(&record).await {
                        warn!(entity = %T::KIND, id, error = %e, "Failed to refresh local cache");
                    }
                    return Ok(Some(record));
                }
                Ok(None) => {
                    debug!(entity = %T::KIND, id, "Not found remotely, checking local store");
                }
                Err(e) => {
                    warn!(entity = %T::KIND, id, error = %e, "Remote get failed, serving local store");
                }
            }
        }

        Ok(self.local.get_by_id(id).await?)
    }

    /// Creates a record.
    ///
    /// The returned record carries the remote id when the remote accepted it,
    /// or a clock-derived local id otherwise.
    pub async fn create(&self, mut record: T) -> SyncResult<T> {
        if self.reachability.is_reachable() {
            match self.remote.create(&record).await {
                Ok(created) => {
                    self.local.cache_remote(&created).await?;
                    debug!(entity = %T::KIND, id = created.id(), "Created remotely");
                    return Ok(created);
                }
                Err(e) => {
                    warn!(
                        entity = %T::KIND,
                        label = %record.label(),
                        error = %e,
                        "Remote create failed, keeping record local until next sync"
                    );
                }
            }
        }

        let id = self.synthesize_id().await?;
        record.set_id(id);
        self.local.upsert(&record).await?;
        debug!(entity = %T::KIND, id, "Created locally");
        Ok(record)
    }

    /// Applies a partial update. Returns `None` if the record does not exist
    /// locally.
    pub async fn update(&self, id: i64, patch: &Value) -> SyncResult<Option<T>> {
        let Some(current) = self.local.get_by_id(id).await? else {
            debug!(entity = %T::KIND, id, "Update of unknown record");
            return Ok(None);
        };

        let mut updated = apply_patch(&current, patch)?;
        updated.touch(Utc::now());
        self.local.upsert(&updated).await?;

        if !self.reachability.is_reachable() {
            debug!(entity = %T::KIND, id, "Remote unreachable, update kept local");
            return Ok(Some(updated));
        }

        match self.remote.update(id, &updated).await {
            Ok(stored) => {
                if let Err(e) = self.local.cache_remote(&stored).await {
                    warn!(entity = %T::KIND, id, error = %e, "Failed to cache remote copy");
                    return Ok(Some(updated));
                }
                Ok(Some(stored))
            }
            Err(e) => {
                warn!(entity = %T::KIND, id, error = %e, "Remote update failed");
                Ok(Some(updated))
            }
        }
    }

    /// Deletes a record. Returns false if the local delete did not happen.
    pub async fn delete(&self, id: i64) -> bool {
        match self.local.delete_by_id(id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(entity = %T::KIND, id, "Delete of unknown record");
                return false;
            }
            Err(e) => {
                error!(entity = %T::KIND, id, error = %e, "Local delete failed");
                return false;
            }
        }

        if self.reachability.is_reachable() {
            if let Err(e) = self.remote.delete(id).await {
                warn!(entity = %T::KIND, id, error = %e, "Remote delete failed");
            }
        }
        true
    }

    /// Records held locally across all tenants.
    pub async fn count_local(&self) -> SyncResult<i64> {
        Ok(self.local.count().await?)
    }

    /// Picks an unused local id from the wall clock.
    async fn synthesize_id(&self) -> SyncResult<i64> {
        let mut id = Utc::now().timestamp_millis();
        while self.local.contains(id).await? {
            id += 1;
        }
        Ok(id)
    }
}
