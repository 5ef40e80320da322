//! DocBridge Backend Daemon
//!
//! This is the main entry point for the DocBridge backend service. It serves
//! every configured account as one document tree:
//! - Account directories scanned into per-account storage managers
//! - Download/upload worker between account directories and the cache
//! - IPC API for clients via Unix domain sockets

use anyhow::{Context, Result};
use clap::Parser;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use docbridge_backend::{AccountStores, ApiHandlers, Config, IpcServer, TransferService};
use docbridge_shared::{init_logging, DocumentsBridge};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML, or TOML with a .toml extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket path for IPC communication
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Cache directory for downloaded documents
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Milliseconds between download completion checks
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Main daemon state
pub struct Daemon {
    ipc_server: IpcServer,
    transfer_worker: JoinHandle<()>,
}

impl Daemon {
    /// Create a new daemon instance
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing DocBridge backend daemon");

        let stores = Arc::new(AccountStores::open(&config).context("Failed to scan accounts")?);
        info!("Account storage initialized for {} accounts", config.accounts.len());

        let (transfer, transfer_worker) = TransferService::spawn(Arc::clone(&stores));
        let bridge = DocumentsBridge::new(
            stores.clone(),
            stores,
            Arc::new(transfer),
            config.bridge.clone(),
        )
        .context("Failed to create document bridge")?;
        let api = Arc::new(ApiHandlers::new(Arc::new(bridge)));

        let ipc_server = IpcServer::new(&config.ipc, api)
            .await
            .context("Failed to initialize IPC server")?;
        info!("IPC server initialized on {:?}", config.ipc.socket_path);

        Ok(Self {
            ipc_server,
            transfer_worker,
        })
    }

    /// Run the daemon
    pub async fn run(self) -> Result<()> {
        info!("Starting DocBridge backend daemon");

        let ipc_server = self.ipc_server;
        let ipc_handle = tokio::spawn(async move {
            if let Err(e) = ipc_server.run().await {
                error!("IPC server error: {}", e);
            }
        });

        // Set up signal handling for graceful shutdown
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to register SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("Failed to register SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            },
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
            },
        }

        info!("Shutting down DocBridge backend daemon");
        ipc_handle.abort();
        self.transfer_worker.abort();

        info!("DocBridge backend daemon stopped");
        Ok(())
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|mut p| {
            p.push("docbridge");
            p.push("backend.yml");
            p
        })
        .unwrap_or_else(|| PathBuf::from("/etc/docbridge/backend.yml"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let loaded = Config::load(&config_path);
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default(),
    };

    init_logging(config.logging.subscriber_config(args.debug));
    info!("Starting DocBridge Backend v{}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = loaded {
        warn!(
            "Failed to load config from {:?}: {}. Using defaults.",
            config_path, e
        );
    }

    // Override config with command line arguments
    if let Some(socket) = args.socket {
        config.ipc.socket_path = socket;
    }
    if let Some(cache_dir) = args.cache_dir {
        config.storage.cache_dir = cache_dir;
    }
    if let Some(interval) = args.poll_interval_ms {
        config.bridge.poll_interval_ms = interval;
    }

    config
        .validate()
        .context("Configuration validation failed")?;
    info!("Configuration loaded and validated");

    let daemon = Daemon::new(config)
        .await
        .context("Failed to create daemon")?;

    match daemon.run().await {
        Ok(()) => {
            info!("Daemon exited successfully");
            Ok(())
        }
        Err(e) => {
            error!("Daemon failed: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_daemon_creation() {
        let temp_dir = tempdir().unwrap();
        let mut config = Config::default();
        config.ipc.socket_path = temp_dir.path().join("test.sock");
        config.storage.cache_dir = temp_dir.path().join("cache");

        let daemon = Daemon::new(config).await;
        assert!(daemon.is_ok());
    }

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from([
            "docbridge-backend",
            "--debug",
            "--socket",
            "/tmp/test.sock",
            "--poll-interval-ms",
            "250",
        ]);

        assert!(args.is_ok());
        let args = args.unwrap();
        assert!(args.debug);
        assert_eq!(args.socket, Some(PathBuf::from("/tmp/test.sock")));
        assert_eq!(args.poll_interval_ms, Some(250));
    }
}
