//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HISAB_REMOTE_URL=https://xyz.supabase.co                           │
//! │     HISAB_COMPANY_ID=7                                                 │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/hisab/sync.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.hisab.hisab/sync.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     SyncMode::Auto, auto-generated device id, no remote                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Shop counter"
//!
//! [remote]
//! url = "https://xyz.supabase.co"
//! api_key = "..."
//! request_timeout_secs = 10
//!
//! [tenant]
//! company_id = 7
//!
//! [sync]
//! mode = "auto"  # auto | manual | offline
//! settle_delay_ms = 2000
//! push_concurrency = 4
//! entities = ["product", "customer", "supplier", "purchase", "sale", "expense", "device"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hisab_core::{EntityKind, TenantScope};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sync Mode
// =============================================================================

/// How reconciliation passes are triggered.
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  AUTO (Default)   passes run on demand AND after the remote comes back │
/// │  MANUAL           passes run only when explicitly invoked               │
/// │  OFFLINE          no remote at all; gateways serve the local store     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Auto,
    Manual,
    Offline,
}

impl SyncMode {
    /// Returns true if a remote store is used at all.
    pub fn is_sync_enabled(&self) -> bool {
        !matches!(self, SyncMode::Offline)
    }

    /// Returns true if reachability edges should trigger passes.
    pub fn is_auto(&self) -> bool {
        matches!(self, SyncMode::Auto)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Auto => write!(f, "auto"),
            SyncMode::Manual => write!(f, "manual"),
            SyncMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(SyncMode::Auto),
            "manual" => Ok(SyncMode::Manual),
            "offline" | "disabled" => Ok(SyncMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown sync mode: '{}'. Valid options: auto, manual, offline",
                other
            ))),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4), generated on first run.
    pub id: String,

    /// Human-readable device name.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Hisab Device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Remote Settings
// =============================================================================

/// Where the remote canonical store lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the PostgREST endpoint (without `/rest/v1`).
    #[serde(default)]
    pub url: Option<String>,

    /// API key sent as `apikey` and as the bearer token.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            url: None,
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RemoteSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// The tenant this device works for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantSettings {
    /// Company id used when no scope is given explicitly.
    #[serde(default)]
    pub company_id: Option<i64>,
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub mode: SyncMode,

    /// Debounce after the remote becomes reachable, before the automatic pass.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Maximum in-flight creates while pushing one entity type.
    #[serde(default = "default_push_concurrency")]
    pub push_concurrency: usize,

    /// Entity kinds reconciled by a pass, in order.
    #[serde(default = "default_entities")]
    pub entities: Vec<EntityKind>,

    /// Probe interval while the remote is reachable (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// First retry delay after a failed probe (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the probe retry delay (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_settle_delay() -> u64 {
    2000
}
fn default_push_concurrency() -> usize {
    4
}
fn default_entities() -> Vec<EntityKind> {
    vec![
        EntityKind::Product,
        EntityKind::Customer,
        EntityKind::Supplier,
        EntityKind::Purchase,
        EntityKind::Sale,
        EntityKind::Expense,
        EntityKind::Device,
    ]
}
fn default_probe_interval() -> u64 {
    30
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::default(),
            settle_delay_ms: default_settle_delay(),
            push_concurrency: default_push_concurrency(),
            entities: default_entities(),
            probe_interval_secs: default_probe_interval(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl SyncSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub tenant: TenantSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<PathBuf> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(path)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        if let Some(ref raw) = self.remote.url {
            let parsed = url::Url::parse(raw)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must start with http:// or https://, got: {}",
                    raw
                )));
            }
        }

        if self.sync.push_concurrency == 0 {
            return Err(SyncError::InvalidConfig(
                "push_concurrency must be greater than 0".into(),
            ));
        }

        if self.sync.entities.is_empty() {
            return Err(SyncError::InvalidConfig(
                "entities must name at least one entity kind".into(),
            ));
        }

        if self.sync.mode.is_sync_enabled() && !self.has_remote() {
            return Err(SyncError::RemoteNotConfigured);
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable values are ignored
    /// with a warning.
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("HISAB_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(name) = lookup("HISAB_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(url) = lookup("HISAB_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = Some(url);
        }

        if let Some(key) = lookup("HISAB_API_KEY") {
            self.remote.api_key = Some(key);
        }

        if let Some(company) = lookup("HISAB_COMPANY_ID") {
            match company.trim().parse::<i64>() {
                Ok(id) => self.tenant.company_id = Some(id),
                Err(_) => warn!(value = %company, "Ignoring non-numeric HISAB_COMPANY_ID"),
            }
        }

        if let Some(mode) = lookup("HISAB_SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding sync mode from environment");
                    self.sync.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown sync mode in environment"),
            }
        }

        if let Some(delay) = lookup("HISAB_SETTLE_DELAY_MS") {
            match delay.trim().parse::<u64>() {
                Ok(ms) => self.sync.settle_delay_ms = ms,
                Err(_) => warn!(value = %delay, "Ignoring invalid HISAB_SETTLE_DELAY_MS"),
            }
        }

        if let Some(concurrency) = lookup("HISAB_PUSH_CONCURRENCY") {
            match concurrency.trim().parse::<usize>() {
                Ok(n) => self.sync.push_concurrency = n,
                Err(_) => warn!(value = %concurrency, "Ignoring invalid HISAB_PUSH_CONCURRENCY"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "hisab", "hisab")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.sync.mode.is_sync_enabled()
    }

    /// Returns true if both the remote URL and the API key are set.
    pub fn has_remote(&self) -> bool {
        self.remote.url.as_deref().is_some_and(|u| !u.trim().is_empty())
            && self.remote.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// The configured tenant scope, if a company is configured.
    pub fn default_scope(&self) -> Option<TenantScope> {
        self.tenant.company_id.map(TenantScope::Company)
    }
}
