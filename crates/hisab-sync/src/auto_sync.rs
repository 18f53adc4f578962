//! # Auto Sync
//!
//! Runs one reconciliation pass each time the remote becomes reachable
//! again, after a short settle delay.
//!
//! ```text
//! reachable: ──false──────┐true───────────────false──┐true──────────
//!                         │                          │
//!                         ▼                          ▼
//!                   settle_delay               settle_delay
//!                         │                          │
//!                 still reachable? ──yes──► sync_all_pending_records(scope)
//!                         │ no
//!                         ▼
//!                    wait for next edge
//! ```

use std::sync::Arc;
use std::time::Duration;

use hisab_core::TenantScope;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::reachability::ReachabilityEvents;

/// Handle for the auto-sync task.
pub struct AutoSyncHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl AutoSyncHandle {
    /// Stops the task and waits for it to exit.
    ///
    /// A pass already running is allowed to finish.
    pub async fn shutdown(self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Failed to send shutdown signal".into()))?;
        self.task
            .await
            .map_err(|e| SyncError::ChannelError(format!("Auto sync task failed: {}", e)))
    }
}

/// Triggers a pass on every unreachable → reachable transition.
pub struct AutoSync {
    engine: Arc<SyncEngine>,
    events: ReachabilityEvents,
    scope: TenantScope,
    settle_delay: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

impl AutoSync {
    pub fn spawn(engine: Arc<SyncEngine>, scope: TenantScope, settle_delay: Duration) -> AutoSyncHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let events = engine.reachability().subscribe();

        let auto = AutoSync {
            engine,
            events,
            scope,
            settle_delay,
            shutdown_rx,
        };
        let task = tokio::spawn(auto.run());

        AutoSyncHandle { shutdown_tx, task }
    }

    async fn run(mut self) {
        info!(scope = %self.scope, settle_delay = ?self.settle_delay, "Auto sync starting");

        loop {
            tokio::select! {
                rose = self.events.became_reachable() => {
                    if !rose {
                        debug!("Reachability signal closed");
                        break;
                    }
                }
                _ = self.shutdown_rx.recv() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settle_delay) => {}
                _ = self.shutdown_rx.recv() => break,
            }

            if !self.engine.reachability().is_reachable() {
                debug!("Remote dropped again during settle delay");
                continue;
            }

            let result = self.engine.sync_all_pending_records(self.scope).await;
            if result.success {
                info!(
                    synced = result.synced,
                    deleted = result.deleted,
                    "Auto sync pass completed"
                );
            } else {
                warn!(errors = ?result.errors, "Auto sync pass failed");
            }
        }

        info!("Auto sync stopped");
    }
}
