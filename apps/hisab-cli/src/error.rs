use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Sync(#[from] hisab_sync::SyncError),
    #[error(transparent)]
    Db(#[from] hisab_db::DbError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Could not determine the application data directory")]
    NoDataDir,
    #[error(
        "No tenant configured. Pass --company <ID>, set HISAB_COMPANY_ID, or use --all-tenants."
    )]
    NoTenant,
    #[error("Sync is disabled (mode = offline). Change [sync] mode in sync.toml to run a pass.")]
    SyncDisabled,
    #[error("Sync pass finished with errors")]
    PassFailed,
}

pub type CliResult<T> = Result<T, CliError>;
