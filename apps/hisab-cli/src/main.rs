//! Hisab CLI - run and watch inventory/sales sync from the terminal.

mod app;
mod console;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use hisab_core::{ReconciliationResult, SyncStatus, TenantScope};
use hisab_sync::{AutoSync, MonitorConfig, Probe, ReachabilityMonitor, SyncConfig};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use app::App;
use console::ConsoleEmitter;
use error::{CliError, CliResult};

#[derive(Parser)]
#[command(name = "hisab")]
#[command(about = "Offline-first inventory and sales sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the local database file
    #[arg(long, value_name = "PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Path to sync.toml
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass
    Sync {
        #[command(flatten)]
        tenant: TenantArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Watch reachability and sync on every reconnect until Ctrl-C
    Watch {
        #[command(flatten)]
        tenant: TenantArgs,
    },
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write a default sync.toml
    Init,
}

#[derive(Args)]
struct TenantArgs {
    /// Reconcile one company's records
    #[arg(long, value_name = "ID", conflicts_with = "all_tenants")]
    company: Option<i64>,
    /// Reconcile every tenant's records
    #[arg(long)]
    all_tenants: bool,
}

impl TenantArgs {
    fn scope(&self, config: &SyncConfig) -> CliResult<TenantScope> {
        if self.all_tenants {
            return Ok(TenantScope::Unscoped);
        }
        self.company
            .map(TenantScope::Company)
            .or_else(|| config.default_scope())
            .ok_or(CliError::NoTenant)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Sync { tenant, json } => {
            let config = SyncConfig::load(cli.config)?;
            if !config.is_sync_enabled() {
                return Err(CliError::SyncDisabled);
            }
            let scope = tenant.scope(&config)?;
            let app = App::open(cli.db_path, config, Arc::new(ConsoleEmitter::new(json))).await?;

            app.probe().await;
            let result = app.engine.sync_all_pending_records(scope).await;
            app.close().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
            if !result.success {
                return Err(CliError::PassFailed);
            }
            Ok(())
        }
        Commands::Status { json } => {
            let config = SyncConfig::load(cli.config)?;
            let app = App::open(cli.db_path, config, Arc::new(ConsoleEmitter::new(true))).await?;

            app.probe().await;
            let status = app.engine.get_sync_status().await?;
            app.close().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
            Ok(())
        }
        Commands::Watch { tenant } => {
            let config = SyncConfig::load(cli.config)?;
            if !config.is_sync_enabled() {
                return Err(CliError::SyncDisabled);
            }
            let scope = tenant.scope(&config)?;
            watch(cli.db_path, config, scope).await
        }
        Commands::Config { action } => match action {
            ConfigCommand::Show => {
                let config = SyncConfig::load_or_default(cli.config);
                print!("{}", toml_string(&config)?);
                Ok(())
            }
            ConfigCommand::Init => {
                let config = SyncConfig::default();
                let path = config.save(cli.config)?;
                println!("Wrote {}", path.display());
                println!("Set [remote] url and api_key before running `hisab sync`.");
                Ok(())
            }
        },
    }
}

async fn watch(db_path: Option<PathBuf>, config: SyncConfig, scope: TenantScope) -> CliResult<()> {
    let auto = config.mode().is_auto();
    let settle_delay = config.sync.settle_delay();
    let monitor_config = MonitorConfig {
        interval: config.sync.probe_interval(),
        initial_backoff: config.sync.initial_backoff(),
        max_backoff: config.sync.max_backoff(),
    };

    let app = App::open(db_path, config, Arc::new(ConsoleEmitter::new(false))).await?;
    let Some(client) = app.client.clone() else {
        return Err(hisab_sync::SyncError::RemoteNotConfigured.into());
    };

    let probe: Arc<dyn Probe> = Arc::new(client);
    let monitor = ReachabilityMonitor::spawn(probe, app.reachability.clone(), monitor_config);
    let auto_sync = if auto {
        Some(AutoSync::spawn(app.engine.clone(), scope, settle_delay))
    } else {
        info!("Manual mode: watching reachability only");
        None
    };

    info!(%scope, auto, "Watching, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if let Some(handle) = auto_sync {
        handle.shutdown().await?;
    }
    monitor.shutdown().await?;
    app.close().await;
    Ok(())
}

fn print_result(result: &ReconciliationResult) {
    println!(
        "{}: pushed {}, failed {}, deleted {}",
        if result.success { "Sync complete" } else { "Sync failed" },
        result.synced,
        result.failed,
        result.deleted
    );
    for error in &result.errors {
        println!("  {}", error);
    }
}

fn print_status(status: &SyncStatus) {
    let last = status
        .last_sync_time
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    println!("Online:          {}", status.is_online);
    println!("Syncing:         {}", status.is_syncing);
    println!("Last sync:       {} ({:?})", last, status.last_sync_status);
    println!("Pending records: {}", status.pending_records);
}

fn toml_string(config: &SyncConfig) -> CliResult<String> {
    toml::to_string_pretty(config)
        .map_err(|e| CliError::Sync(hisab_sync::SyncError::ConfigSaveFailed(e.to_string())))
}

/// Initializes the tracing subscriber for structured logging.
///
/// Defaults to INFO (DEBUG for hisab crates); override with `RUST_LOG`.
/// Logs go to stderr so `--json` output stays clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hisab=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .with_writer(std::io::stderr)
        .init();
}
