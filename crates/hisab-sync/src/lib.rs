//! # hisab-sync: Sync Engine for Hisab
//!
//! Keeps a device's local store and the remote canonical store in step.
//! Every operation works offline; reconciliation runs when the remote is
//! reachable again.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    GatewayRegistry (x8 kinds)                    │  │
//! │  │                                                                  │  │
//! │  │  EntityGateway<T>: get_all / get_by_id / create / update /       │  │
//! │  │  delete, remote first when reachable, local store always         │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ SyncTarget                              │
//! │                               ▼                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  SyncEngine    │  │  Reachability  │  │  AutoSync              │    │
//! │  │                │  │                │  │                        │    │
//! │  │ push unsynced  │◄─│ watch<bool>    │─►│ false → true edge,     │    │
//! │  │ delete missing │  │ Monitor probes │  │ settle delay, one pass │    │
//! │  │ one pass at a  │  │ with backoff   │  │                        │    │
//! │  │ time           │  │                │  │                        │    │
//! │  └───────┬────────┘  └────────────────┘  └────────────────────────┘    │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  ┌────────────────┐  ┌────────────────────────────────────────────┐    │
//! │  │ SyncStatus     │  │ RemoteStore<T>                             │    │
//! │  │ Register       │  │  RestRemoteStore   (PostgREST over HTTP)   │    │
//! │  │ persisted row  │  │  MemoryRemoteStore (in-process, faults)    │    │
//! │  └────────────────┘  └────────────────────────────────────────────┘    │
//! │                                                                         │
//! │  STATUS EVENTS (SyncEventEmitter):                                     │
//! │  • status   - pass started / finished                                  │
//! │  • progress - one entity kind reconciled                               │
//! │  • error    - one error entry                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`auto_sync`] - Reconnect-triggered passes
//! - [`config`] - Sync configuration (mode, device, remote, tenant)
//! - [`engine`] - Reconciliation and the `SyncEngine`
//! - [`error`] - Sync error types
//! - [`gateway`] - Local-first CRUD per entity kind
//! - [`reachability`] - Reachability signal and probe monitor
//! - [`registry`] - All gateways of a device
//! - [`remote`] - Remote store trait and implementations
//! - [`status`] - The persisted sync status and in-progress guard
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hisab_sync::{GatewayRegistry, Reachability, RestClient, SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::load_or_default(None);
//! let client = RestClient::new(&config.remote)?;
//! let reachability = Reachability::new(false);
//! reachability.refresh(&client).await;
//!
//! let registry = GatewayRegistry::connect(&db, &client, reachability.clone());
//! let engine = SyncEngine::builder()
//!     .with_targets(registry.targets(&config.sync.entities))
//!     .with_status_register(Arc::new(SyncStatusRegister::load(db.sync_status()).await?))
//!     .with_reachability(reachability)
//!     .build()?;
//!
//! let result = engine.sync_all_pending_records(TenantScope::Company(7)).await;
//! println!("pushed {}, deleted {}", result.synced, result.deleted);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auto_sync;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod reachability;
pub mod registry;
pub mod remote;
pub mod status;

// =============================================================================
// Re-exports
// =============================================================================

pub use auto_sync::{AutoSync, AutoSyncHandle};
pub use config::{DeviceConfig, RemoteSettings, SyncConfig, SyncMode, SyncSettings, TenantSettings};
pub use engine::{
    EntityOutcome, NoOpEmitter, SyncEngine, SyncEngineBuilder, SyncEventEmitter, SyncTarget,
};
pub use error::{SyncError, SyncResult};
pub use gateway::EntityGateway;
pub use reachability::{
    MonitorConfig, Probe, Reachability, ReachabilityEvents, ReachabilityMonitor,
    ReachabilityMonitorHandle,
};
pub use registry::{GatewayRegistry, RemoteSource};
pub use remote::{MemoryRemoteStore, RemoteError, RemoteResult, RemoteStore, RestClient, RestRemoteStore};
pub use status::{PassGuard, SyncStatusRegister};
