//! # Repository Module
//!
//! Local store repositories.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  EntityGateway<Product> / SyncEngine                                    │
//! │       │                                                                 │
//! │       │  db.collection::<Product>().get_scoped(scope)                   │
//! │       ▼                                                                 │
//! │  CollectionRepository<Product>                                          │
//! │  ├── get_all / get_scoped / get_entries / list                          │
//! │  ├── get_by_id / contains                                               │
//! │  ├── upsert / upsert_many              (local writes)                   │
//! │  ├── cache_remote / cache_remote_many  (remote responses)               │
//! │  ├── replace_with_remote / mark_synced                                  │
//! │  └── delete_by_id / count                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite: local_records                                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CollectionRepository`](collection::CollectionRepository) - Keyed record collection per entity kind
//! - [`SyncStatusRepository`](sync_status::SyncStatusRepository) - Persisted sync status row

pub mod collection;
pub mod sync_status;
