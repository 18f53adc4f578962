//! # hisab-db: Local Store for Hisab
//!
//! The always-available on-device record store. SQLite via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Hisab Data Flow                                  │
//! │                                                                         │
//! │  EntityGateway / SyncEngine (hisab-sync)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     hisab-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │◄───│ CollectionRepo<T>  │  │ (embedded) │  │   │
//! │  │   │  SqlitePool   │    │ SyncStatusRepo     │  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (HISAB_DB_PATH or the platform data dir)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hisab_core::{Product, TenantScope};
//! use hisab_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/hisab.db")).await?;
//!
//! let products = db.collection::<Product>();
//! let mine = products.get_scoped(TenantScope::Company(7)).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::collection::{CollectionRepository, LocalEntry};
pub use repository::sync_status::SyncStatusRepository;
