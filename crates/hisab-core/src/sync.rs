//! # Sync Summaries
//!
//! The values a reconciliation pass produces and the status register the UI
//! layer reads. Both are exported to TypeScript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::EntityKind;

// =============================================================================
// Sync Status
// =============================================================================

/// Outcome of the most recent pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum LastSyncStatus {
    /// No pass has completed on this device yet.
    #[default]
    Never,
    Success,
    Failed,
}

impl LastSyncStatus {
    /// Status recorded at the end of a pass.
    ///
    /// A pass that pushed something counts as a success even if other
    /// records failed; those are retried next time.
    pub fn from_counts(synced: u32, failed: u32) -> Self {
        if failed == 0 || synced > 0 {
            LastSyncStatus::Success
        } else {
            LastSyncStatus::Failed
        }
    }
}

/// Process-wide sync status.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// When the last pass finished.
    #[ts(as = "Option<String>")]
    pub last_sync_time: Option<DateTime<Utc>>,

    pub last_sync_status: LastSyncStatus,

    /// Local records that may still need pushing.
    pub pending_records: i64,

    pub is_syncing: bool,

    /// Whether the remote store is currently reachable.
    pub is_online: bool,
}

// =============================================================================
// Reconciliation Result
// =============================================================================

/// Per-entity-kind breakdown of a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct EntityReport {
    pub kind: EntityKind,
    pub synced: u32,
    pub failed: u32,
    pub deleted: u32,
    pub error_count: u32,
    /// The collection could not be read; nothing was pushed or deleted.
    pub skipped: bool,
}

impl EntityReport {
    pub fn new(kind: EntityKind) -> Self {
        EntityReport {
            kind,
            synced: 0,
            failed: 0,
            deleted: 0,
            error_count: 0,
            skipped: false,
        }
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub success: bool,
    pub synced: u32,
    pub failed: u32,
    pub deleted: u32,
    pub errors: Vec<String>,
    pub entities: Vec<EntityReport>,
}

impl ReconciliationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// A result that did no work and carries a single error.
    pub fn aborted(message: impl Into<String>) -> Self {
        ReconciliationResult {
            success: false,
            errors: vec![message.into()],
            ..Self::default()
        }
    }

    /// Folds one entity kind's outcome into the pass total.
    pub fn absorb(&mut self, report: EntityReport, errors: Vec<String>) {
        self.synced += report.synced;
        self.failed += report.failed;
        self.deleted += report.deleted;
        self.errors.extend(errors);
        self.entities.push(report);
    }

    /// Sets `success` from the counters. Called once all kinds are in.
    pub fn finish(&mut self) {
        self.success = self.failed == 0 || self.synced > 0;
    }

    pub fn report(&self, kind: EntityKind) -> Option<&EntityReport> {
        self.entities.iter().find(|r| r.kind == kind)
    }

    /// Status to persist for this pass.
    pub fn last_sync_status(&self) -> LastSyncStatus {
        LastSyncStatus::from_counts(self.synced, self.failed)
    }
}
