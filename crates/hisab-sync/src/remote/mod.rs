//! # Remote Store Client
//!
//! The network-backed canonical store, one [`RemoteStore`] per record type.
//!
//! ## Implementations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         RemoteStore<T>                                  │
//! │                                                                         │
//! │   list(scope, include_archived)   GET    /rest/v1/<table>?company_id=  │
//! │   get(id)                         GET    /rest/v1/<table>?id=eq.<id>   │
//! │   create(record)                  POST   /rest/v1/<table>  (no id)     │
//! │   update(id, record)              PATCH  /rest/v1/<table>?id=eq.<id>   │
//! │   delete(id)                      DELETE /rest/v1/<table>?id=eq.<id>   │
//! │                                                                         │
//! │   ┌──────────────────────┐        ┌──────────────────────────┐         │
//! │   │ RestRemoteStore<T>   │        │ MemoryRemoteStore<T>     │         │
//! │   │ PostgREST over HTTP  │        │ in-process, with fault   │         │
//! │   │ (rest.rs)            │        │ injection (memory.rs)    │         │
//! │   └──────────────────────┘        └──────────────────────────┘         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every listing is tenant-scoped by an equality filter on `company_id`;
//! only [`TenantScope::Unscoped`] omits it.

use async_trait::async_trait;
use thiserror::Error;

use hisab_core::{EntityKind, Record, TenantScope};

pub mod memory;
pub mod rest;

pub use memory::MemoryRemoteStore;
pub use rest::{RestClient, RestRemoteStore};

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Remote store failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// No usable network path to the remote store.
    #[error("Remote store unreachable: {0}")]
    Unreachable(String),

    /// The request did not complete in time.
    #[error("Remote request timed out after {0} seconds")]
    Timeout(u64),

    /// The remote store answered with an error (validation, conflict, rate limit).
    #[error("Remote store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The addressed record does not exist remotely.
    #[error("{kind} {id} not found on remote store")]
    NotFound { kind: EntityKind, id: i64 },

    /// The response could not be understood.
    #[error("Unexpected response from remote store: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Returns true if the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Unreachable(_) | RemoteError::Timeout(_) => true,
            RemoteError::Rejected { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            RemoteError::NotFound { .. } | RemoteError::Decode(_) => false,
        }
    }
}

/// Canonical store for one record type.
#[async_trait]
pub trait RemoteStore<T: Record>: Send + Sync {
    /// Records inside `scope`, optionally including archived ones.
    async fn list(&self, scope: TenantScope, include_archived: bool) -> RemoteResult<Vec<T>>;

    async fn get(&self, id: i64) -> RemoteResult<Option<T>>;

    /// Creates a record. The remote store assigns the id; the stored row is returned.
    async fn create(&self, record: &T) -> RemoteResult<T>;

    /// Replaces the record's fields and returns the stored row.
    async fn update(&self, id: i64, record: &T) -> RemoteResult<T>;

    async fn delete(&self, id: i64) -> RemoteResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RemoteError::Unreachable("refused".into()).is_retryable());
        assert!(RemoteError::Timeout(10).is_retryable());
        assert!(RemoteError::Rejected {
            status: 503,
            message: "busy".into()
        }
        .is_retryable());
        assert!(RemoteError::Rejected {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!RemoteError::Rejected {
            status: 409,
            message: "duplicate key".into()
        }
        .is_retryable());
        assert!(!RemoteError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn test_not_found_display() {
        let err = RemoteError::NotFound {
            kind: EntityKind::Customer,
            id: 9,
        };
        assert_eq!(err.to_string(), "customer 9 not found on remote store");
    }
}
