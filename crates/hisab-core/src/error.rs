//! # Error Types
//!
//! Domain-specific error types for hisab-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       CoreError (pure, no I/O)                          │
//! │                                                                         │
//! │  ┌───────────────────┐  ┌───────────────────┐  ┌────────────────────┐  │
//! │  │ UnknownEntityKind │  │   InvalidPatch    │  │   Serialization    │  │
//! │  │                   │  │                   │  │                    │  │
//! │  │ "widgets" in a    │  │ update payload is │  │ record <-> JSON    │  │
//! │  │ config entity list│  │ not a JSON object │  │ conversion failed  │  │
//! │  └───────────────────┘  └───────────────────┘  └────────────────────┘  │
//! │                                                                         │
//! │  Wrapped by DbError (hisab-db) and SyncError (hisab-sync).             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An entity kind name could not be parsed.
    ///
    /// ## When This Occurs
    /// - A typo in the `entities` list of `sync.toml`
    /// - An unknown `entity` value read back from the local store
    #[error("Unknown entity kind: '{0}'")]
    UnknownEntityKind(String),

    /// A partial update could not be applied to a record.
    ///
    /// ## When This Occurs
    /// - The patch is not a JSON object
    /// - The merged document no longer deserializes into the record type
    ///   (e.g. `"amount": "lots"` on an expense)
    #[error("Invalid patch for {entity}: {reason}")]
    InvalidPatch { entity: String, reason: String },

    /// A record could not be converted to or from JSON.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Creates an InvalidPatch error.
    pub fn invalid_patch(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidPatch {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
