//! hotroute server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     route/*.zip ─────┐                 security/*.zip ──┐
//!                      ▼                                  ▼
//!              ┌──────────────┐                   ┌──────────────┐
//!              │ DirWatcher + │                   │ DirWatcher + │
//!              │ BundleScanner│                   │ BundleScanner│
//!              └──────┬───────┘                   └──────┬───────┘
//!                     ▼                                  ▼
//!              ┌──────────────┐                   ┌──────────────┐
//!              │RouteRegistry │                   │SecurityRegist│
//!              └──────┬───────┘                   └──────┬───────┘
//!                     └───────────────┬──────────────────┘
//!                                     ▼
//!     Client ──▶ HttpServer ──▶ Dispatcher ──▶ handler ──▶ Response
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use hotroute::bundle::ProviderTable;
use hotroute::config::{load_config, validate_config, ConfigError, ServerConfig};
use hotroute::http::HttpServer;
use hotroute::lifecycle::{bootstrap, signals, Shutdown};
use hotroute::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "hotroute")]
#[command(about = "HTTP server with hot-reloadable route and security bundles", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,

    /// Override routes.directory
    #[arg(long)]
    route_dir: Option<PathBuf>,

    /// Override security.directory
    #[arg(long)]
    security_dir: Option<PathBuf>,

    /// Scan bundles once at startup without watching for changes
    #[arg(long)]
    no_watch: bool,
}

impl Args {
    fn load(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(dir) = &self.route_dir {
            config.routes.directory = Some(dir.clone());
        }
        if let Some(dir) = &self.security_dir {
            config.security.directory = Some(dir.clone());
        }
        if self.no_watch {
            config.routes.watch = false;
            config.security.watch = false;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = args.load()?;

    logging::init(&config.observability.log_level)?;
    tracing::info!("hotroute v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        route_dir = ?config.route_dir(),
        security_dir = ?config.security_dir(),
        max_content_length = config.listener.max_content_length,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut services = bootstrap(&config, Arc::new(ProviderTable::with_defaults()))?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    let server = HttpServer::new(Arc::new(services.dispatcher.clone()), &config.listener);
    server.run(listener, shutdown.signal()).await?;

    services.stop_watchers();
    tracing::info!("Shutdown complete");
    Ok(())
}
