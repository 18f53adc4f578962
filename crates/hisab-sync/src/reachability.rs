//! # Reachability Signal
//!
//! Tracks whether the remote store can currently be reached, and notifies
//! subscribers when it comes back.
//!
//! ## Signal Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ReachabilityMonitor ──probe()──► RestClient (any HTTP answer = up)    │
//! │         │                                                               │
//! │         │ set_reachable(bool)       only notifies on change             │
//! │         ▼                                                               │
//! │  Reachability (watch<bool>) ───────► EntityGateway   (is_reachable)    │
//! │         │                   ───────► SyncEngine      (is_reachable)    │
//! │         │ subscribe()                                                   │
//! │         ▼                                                               │
//! │  ReachabilityEvents::became_reachable()   resolves on false → true     │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  AutoSync (settle delay, then one pass)                                │
//! │                                                                         │
//! │  PROBE CADENCE:                                                        │
//! │  ──────────────                                                        │
//! │  up:   every probe_interval                                            │
//! │  down: 500ms → 1s → 2s → ... → max_backoff (reset on first success)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Reachability Signal
// =============================================================================

/// Shared, cloneable reachability flag.
#[derive(Debug, Clone)]
pub struct Reachability {
    tx: Arc<watch::Sender<bool>>,
}

impl Reachability {
    pub fn new(initially_reachable: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_reachable);
        Reachability { tx: Arc::new(tx) }
    }

    pub fn is_reachable(&self) -> bool {
        *self.tx.borrow()
    }

    /// Updates the flag. Returns true if the value changed.
    pub fn set_reachable(&self, reachable: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        })
    }

    /// Probes once and records the answer.
    pub async fn refresh(&self, probe: &dyn Probe) -> bool {
        let reachable = probe.probe().await;
        if self.set_reachable(reachable) {
            info!(reachable, "Remote reachability changed");
        }
        reachable
    }

    pub fn subscribe(&self) -> ReachabilityEvents {
        let rx = self.tx.subscribe();
        let last = *rx.borrow();
        ReachabilityEvents { rx, last }
    }
}

/// Receiver side of [`Reachability`].
#[derive(Debug)]
pub struct ReachabilityEvents {
    rx: watch::Receiver<bool>,
    last: bool,
}

impl ReachabilityEvents {
    /// Waits for the next unreachable → reachable transition.
    ///
    /// Returns false once every [`Reachability`] handle has been dropped.
    /// Rapid flapping between two polls is coalesced into the latest value.
    pub async fn became_reachable(&mut self) -> bool {
        loop {
            if self.rx.changed().await.is_err() {
                return false;
            }
            let now = *self.rx.borrow_and_update();
            let rose = !self.last && now;
            self.last = now;
            if rose {
                return true;
            }
        }
    }
}

// =============================================================================
// Probe
// =============================================================================

/// Something that can tell whether the remote store answers.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self) -> bool;
}

// =============================================================================
// Monitor
// =============================================================================

/// Monitor timing.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Probe interval while reachable.
    pub interval: Duration,

    /// First retry delay after a failed probe.
    pub initial_backoff: Duration,

    /// Upper bound on the retry delay.
    pub max_backoff: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            interval: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Handle for a running monitor.
pub struct ReachabilityMonitorHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ReachabilityMonitorHandle {
    /// Stops the monitor and waits for it to exit.
    pub async fn shutdown(self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Failed to send shutdown signal".into()))?;
        self.task
            .await
            .map_err(|e| SyncError::ChannelError(format!("Monitor task failed: {}", e)))
    }
}

/// Background task that keeps a [`Reachability`] current.
pub struct ReachabilityMonitor {
    probe: Arc<dyn Probe>,
    reachability: Reachability,
    config: MonitorConfig,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ReachabilityMonitor {
    /// Spawns the probe loop.
    pub fn spawn(
        probe: Arc<dyn Probe>,
        reachability: Reachability,
        config: MonitorConfig,
    ) -> ReachabilityMonitorHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let monitor = ReachabilityMonitor {
            probe,
            reachability,
            config,
            shutdown_rx,
        };
        let task = tokio::spawn(monitor.run());

        ReachabilityMonitorHandle { shutdown_tx, task }
    }

    async fn run(mut self) {
        info!(interval = ?self.config.interval, "Reachability monitor starting");
        let mut backoff = self.create_backoff();

        loop {
            let reachable = self.reachability.refresh(self.probe.as_ref()).await;

            let wait = if reachable {
                backoff.reset();
                self.config.interval
            } else {
                backoff.next_backoff().unwrap_or(self.config.max_backoff)
            };
            debug!(reachable, ?wait, "Next reachability probe scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown_rx.recv() => {
                    info!("Reachability monitor received shutdown");
                    break;
                }
            }
        }

        info!("Reachability monitor stopped");
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FlagProbe {
        up: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Probe for FlagProbe {
        async fn probe(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.up.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_set_reachable_reports_changes() {
        let reachability = Reachability::new(false);
        assert!(!reachability.is_reachable());

        assert!(reachability.set_reachable(true));
        assert!(!reachability.set_reachable(true));
        assert!(reachability.is_reachable());
    }

    #[tokio::test]
    async fn test_became_reachable_fires_on_rising_edge_only() {
        let reachability = Reachability::new(true);
        let mut events = reachability.subscribe();

        let signal = reachability.clone();
        let waiter = tokio::spawn(async move { events.became_reachable().await });

        // true -> false is not an edge we care about.
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.set_reachable(false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        signal.set_reachable(true);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_became_reachable_ends_when_signal_dropped() {
        let reachability = Reachability::new(false);
        let mut events = reachability.subscribe();
        drop(reachability);

        assert!(!events.became_reachable().await);
    }

    #[tokio::test]
    async fn test_monitor_tracks_probe() {
        let probe = Arc::new(FlagProbe {
            up: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        });
        let reachability = Reachability::new(false);
        let mut events = reachability.subscribe();

        let handle = ReachabilityMonitor::spawn(
            probe.clone(),
            reachability.clone(),
            MonitorConfig {
                interval: Duration::from_millis(20),
                initial_backoff: Duration::from_millis(5),
                max_backoff: Duration::from_millis(20),
            },
        );

        probe.up.store(true, Ordering::SeqCst);
        let rose = tokio::time::timeout(Duration::from_secs(5), events.became_reachable())
            .await
            .unwrap();
        assert!(rose);
        assert!(reachability.is_reachable());
        assert!(probe.calls.load(Ordering::SeqCst) >= 1);

        handle.shutdown().await.unwrap();
    }
}
