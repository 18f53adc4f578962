//! # Sync Status Register
//!
//! Single owner of the process-wide `SyncStatus`. Replaces a free-floating
//! "is syncing" flag with an atomic guard plus a persisted snapshot.
//!
//! ## Pass Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  try_begin() ──► AtomicBool false → true ?                              │
//! │                     │ no  ──► None  ("Sync already in progress")        │
//! │                     │ yes ──► PassGuard, is_syncing = true (persisted)  │
//! │                     ▼                                                   │
//! │               ... reconcile every entity kind ...                       │
//! │                     │                                                   │
//! │  finish(guard) ──► last_sync_time = now                                 │
//! │                    last_sync_status = from_counts(synced, failed)       │
//! │                    is_syncing = false, pending_records = 0 (persisted)  │
//! │                                                                         │
//! │  A guard dropped without finish() only clears the in-memory flag.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use hisab_core::{ReconciliationResult, SyncStatus};
use hisab_db::SyncStatusRepository;

use crate::error::SyncResult;

/// Owns the sync status and the in-progress flag.
#[derive(Debug)]
pub struct SyncStatusRegister {
    repo: SyncStatusRepository,
    status: RwLock<SyncStatus>,
    in_progress: Arc<AtomicBool>,
}

/// Proof that a pass is running. Clears the in-progress flag on drop.
#[derive(Debug)]
pub struct PassGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl SyncStatusRegister {
    /// Loads the persisted status.
    ///
    /// A stored `is_syncing = true` is stale (no pass survives its process)
    /// and is reset.
    pub async fn load(repo: SyncStatusRepository) -> SyncResult<Self> {
        let mut status = repo.load().await?;
        if status.is_syncing {
            info!("Clearing stale in-progress flag from a previous run");
            status.is_syncing = false;
            repo.save(&status).await?;
        }

        Ok(SyncStatusRegister {
            repo,
            status: RwLock::new(status),
            in_progress: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Current status as last recorded.
    pub async fn snapshot(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Claims the pass slot. Returns `None` if a pass is already running.
    pub async fn try_begin(&self) -> SyncResult<Option<PassGuard>> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Pass already in progress");
            return Ok(None);
        }

        let guard = PassGuard {
            flag: Arc::clone(&self.in_progress),
        };

        let mut status = self.status.write().await;
        status.is_syncing = true;
        if let Err(e) = self.repo.save(&status).await {
            // Dropping the guard releases the slot.
            status.is_syncing = false;
            return Err(e.into());
        }

        Ok(Some(guard))
    }

    /// Records the outcome of a finished pass and releases the slot.
    pub async fn finish(&self, guard: PassGuard, result: &ReconciliationResult) -> SyncResult<SyncStatus> {
        let mut status = self.status.write().await;
        status.last_sync_time = Some(Utc::now());
        status.last_sync_status = result.last_sync_status();
        status.is_syncing = false;
        status.pending_records = 0;

        let saved = self.repo.save(&status).await;
        drop(guard);
        saved?;

        info!(
            last_sync_status = ?status.last_sync_status,
            synced = result.synced,
            failed = result.failed,
            deleted = result.deleted,
            "Sync status recorded"
        );
        Ok(status.clone())
    }
}
