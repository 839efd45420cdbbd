/*!
 * bluebridge daemon
 * HTTP control surface for a paired Bluetooth media device
 */

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

mod address;
mod api;
mod bluetooth;
mod bridge;
mod config;
mod refresh;
mod reply;
mod settings;

use address::AddressStore;
use api::ApiState;
use bluetooth::BluetoothManager;
use bridge::{Bridge, SystemRunner};
use config::DaemonConfig;
use refresh::AddressRefresher;
use settings::SettingsStore;

#[derive(Parser)]
#[command(name = "bluebridged")]
#[command(about = "HTTP control bridge for a paired Bluetooth media device")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/bluebridge/bluebridged.toml")]
    config: String,

    /// Settings file, overriding the one named in the config
    #[arg(short, long)]
    settings_file: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Run,
    /// Load the configuration and settings, print them, and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --debug
    let log_level = if cli.debug { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "bluebridge_daemon={},tower_http={}",
            log_level, log_level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("bluebridge daemon starting...");

    let mut config = DaemonConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config))?;
    if let Some(path) = cli.settings_file {
        config.settings_file = path;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
        Commands::CheckConfig => check_config(config).await,
    }
}

async fn run_daemon(config: DaemonConfig) -> Result<()> {
    let settings = Arc::new(
        SettingsStore::load(&config.settings_file)
            .with_context(|| format!("loading settings from {}", config.settings_file))?,
    );
    info!(
        "Using settings: {}",
        serde_json::to_string(&settings.all().await)?
    );

    let address = Arc::new(AddressStore::from_settings(settings.clone()).await);
    let bridge = Arc::new(Bridge::new(
        Arc::new(SystemRunner),
        address,
        &config.bluetooth,
    ));
    let bluetooth = Arc::new(BluetoothManager::new(bridge, &config.bluetooth));
    let refresher = AddressRefresher::new(bluetooth.clone(), config.bluetooth.refresh_interval());

    let refresh_task = if config.bluetooth.auto_refresh {
        Some(refresher.spawn())
    } else {
        info!("Address auto refresh disabled");
        None
    };

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;

    let state = ApiState {
        bluetooth,
        refresher,
        settings,
    };
    api::serve(listener, state, shutdown_signal()).await?;

    if let Some(task) = refresh_task {
        task.abort();
    }
    info!("bluebridge daemon stopped");
    Ok(())
}

async fn check_config(config: DaemonConfig) -> Result<()> {
    let settings = SettingsStore::load(&config.settings_file)?;
    println!("{}", toml::to_string_pretty(&config)?);
    println!("{}", serde_json::to_string_pretty(&settings.all().await)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
