//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │        Local            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Unreachable    │  │  DbError (never         │ │
//! │  │  MissingDeviceId│  │  Timeout        │  │  swallowed: local       │ │
//! │  │  InvalidUrl     │  │  Rejected       │  │  durability is the one  │ │
//! │  │  RemoteNotConf. │  │  (RemoteError)  │  │  guarantee we make)     │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Record       │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  CoreError      │  │  ShuttingDown   │                              │
//! │  │  (bad patch)    │  │  ChannelError   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote errors only reach callers through [`SyncError::Remote`] when a
//! caller explicitly talks to the remote store; gateways and the engine
//! absorb them.

use thiserror::Error;

use hisab_core::CoreError;
use hisab_db::DbError;

use crate::remote::RemoteError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Missing device ID.
    #[error("Device ID not configured. Run `hisab config init` first.")]
    MissingDeviceId,

    /// Invalid remote URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Remote URL or API key missing while sync is enabled.
    #[error("Remote store is not configured: set [remote] url and api_key")]
    RemoteNotConfigured,

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Remote store call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Local store failed.
    #[error("Local store error: {0}")]
    Local(#[from] DbError),

    /// A record could not be built or merged.
    #[error(transparent)]
    Record(#[from] CoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Background task is shutting down.
    #[error("Sync task is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) => err.is_retryable(),
            SyncError::Local(DbError::PoolExhausted) => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingDeviceId
                | SyncError::InvalidUrl(_)
                | SyncError::RemoteNotConfigured
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Remote(RemoteError::Unreachable("dns".into())).is_retryable());
        assert!(SyncError::Remote(RemoteError::Timeout(10)).is_retryable());
        assert!(SyncError::Local(DbError::PoolExhausted).is_retryable());

        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::Remote(RemoteError::Rejected {
            status: 400,
            message: "bad column".into()
        })
        .is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::MissingDeviceId.is_config_error());
        assert!(SyncError::RemoteNotConfigured.is_config_error());
        assert!(!SyncError::ShuttingDown.is_config_error());
    }

    #[test]
    fn test_local_error_display() {
        let err = SyncError::from(DbError::PoolExhausted);
        assert_eq!(err.to_string(), "Local store error: Connection pool exhausted");
    }
}
