//! # hisab-core: Pure Types for the Hisab Sync Engine
//!
//! Everything the sync engine needs to *reason* about records, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Hisab Workspace                               │
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │                    hisab-core (THIS CRATE)                        │ │
//! │  │                                                                   │ │
//! │  │   types.rs        Product, Customer, ... , EntityKind            │ │
//! │  │   record.rs       Record trait, TenantScope, apply_patch         │ │
//! │  │   natural_key.rs  key rule tables, resolve(), IdentitySet        │ │
//! │  │   sync.rs         SyncStatus, ReconciliationResult               │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! │          ▲                                  ▲                          │
//! │          │                                  │                          │
//! │  ┌───────┴────────┐                ┌────────┴─────────┐                │
//! │  │   hisab-db     │◄───────────────│   hisab-sync     │                │
//! │  │  local store   │                │ gateways, engine │                │
//! │  └────────────────┘                └──────────────────┘                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - The eight mirrored record types
//! - [`record`] - The `Record` contract and tenant scoping
//! - [`natural_key`] - Content-derived identity used to match records across stores
//! - [`sync`] - Pass results and the status register value
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use hisab_core::{natural_key, Product};
//!
//! let product = Product {
//!     name: "Widget".into(),
//!     sku: Some("ABC-1".into()),
//!     ..Default::default()
//! };
//!
//! assert_eq!(natural_key::resolve(&product).as_str(), "sku:abc-1");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod natural_key;
pub mod record;
pub mod sync;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use natural_key::{IdentitySet, KeyRule, NaturalKey};
pub use record::{apply_patch, without_id, Record, TenantScope};
pub use sync::{EntityReport, LastSyncStatus, ReconciliationResult, SyncStatus};
pub use types::*;
