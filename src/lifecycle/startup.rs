//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the route and security registries and the dispatcher
//! - Register the built-in ping route
//! - Subscribe to both bundle directories, scan them, then start their watchers
//!
//! # Design Decisions
//! - Fail fast when a bundle directory cannot be created or listed
//! - A watcher that cannot start is logged; the server still runs without hot reload
//! - Listeners start after this returns (traffic only when ready)

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::bundle::resolver::{ProviderHandler, Resolver};
use crate::bundle::scanner::{BundleError, BundleScanner, ScanSettings};
use crate::bundle::watcher::{DirectoryWatcher, NotifyChannel, WatchBackend};
use crate::config::schema::{
    BundleDirConfig, ServerConfig, WatcherConfig, DEFAULT_ROUTE_METADATA_DIR, DEFAULT_SECURITY_METADATA_DIR,
};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::routing::dispatcher::Dispatcher;
use crate::routing::mapping::{Mapping, RouteHandler, SecurityHandler};
use crate::routing::matcher::MatchCompilationError;
use crate::routing::registry::{Registry, RouteRegistry, SecurityRegistry};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid ping route: {0}")]
    Ping(#[from] MatchCompilationError),

    #[error("bundle directory {directory:?}: {source}")]
    Bundle {
        directory: PathBuf,
        #[source]
        source: BundleError,
    },
}

/// Everything the server needs at runtime.
pub struct Services {
    pub dispatcher: Dispatcher,
    pub route_scanner: Option<Arc<BundleScanner<RouteHandler>>>,
    pub security_scanner: Option<Arc<BundleScanner<SecurityHandler>>>,
    watchers: Vec<DirectoryWatcher>,
}

impl Services {
    /// Names of the watcher threads still running.
    pub fn running_watchers(&self) -> Vec<&str> {
        self.watchers
            .iter()
            .filter(|w| w.is_running())
            .map(DirectoryWatcher::name)
            .collect()
    }

    /// Stop the directory watchers and wait for their threads.
    pub fn stop_watchers(&mut self) {
        for watcher in &mut self.watchers {
            watcher.stop();
        }
        self.watchers.clear();
    }
}

/// Build registries, register built-ins, scan bundles and start watchers.
pub fn bootstrap(config: &ServerConfig, resolver: Arc<dyn Resolver>) -> Result<Services, StartupError> {
    let routes = Arc::new(RouteRegistry::new("route"));
    let security = Arc::new(SecurityRegistry::new("security"));

    if config.ping.enabled {
        let pong: RouteHandler = Arc::new(|_: &Request| Response::ok().text("pong"));
        routes.register(Mapping::simple(&config.ping.path, pong)?);
        tracing::info!(path = %config.ping.path, "Registered ping route");
    }

    let mut watchers = Vec::new();
    let route_scanner = start_directory(
        &routes,
        &config.routes,
        config.route_dir(),
        DEFAULT_ROUTE_METADATA_DIR,
        &resolver,
        &config.watcher,
        &mut watchers,
    )?;
    let security_scanner = start_directory(
        &security,
        &config.security,
        config.security_dir(),
        DEFAULT_SECURITY_METADATA_DIR,
        &resolver,
        &config.watcher,
        &mut watchers,
    )?;

    tracing::info!(
        routes = routes.len(),
        security = security.len(),
        watchers = watchers.len(),
        "Startup complete"
    );

    Ok(Services {
        dispatcher: Dispatcher::new(routes, security),
        route_scanner,
        security_scanner,
        watchers,
    })
}

fn start_directory<H: ProviderHandler>(
    registry: &Arc<Registry<H>>,
    dir: &BundleDirConfig,
    directory: PathBuf,
    default_metadata_dir: &str,
    resolver: &Arc<dyn Resolver>,
    watcher: &WatcherConfig,
    watchers: &mut Vec<DirectoryWatcher>,
) -> Result<Option<Arc<BundleScanner<H>>>, StartupError> {
    if !dir.enabled {
        tracing::info!(kind = registry.kind(), "Bundle directory disabled");
        return Ok(None);
    }

    let bundle_error = |source| StartupError::Bundle {
        directory: directory.clone(),
        source,
    };
    let settings = ScanSettings {
        directory: directory.clone(),
        bundle_glob: dir.bundle_glob.clone(),
        metadata_dir: dir.metadata_dir_or(default_metadata_dir),
        scan_timeout: dir.scan_timeout(),
    };
    let scanner = Arc::new(
        BundleScanner::new(Arc::clone(registry), Arc::clone(resolver), settings).map_err(bundle_error)?,
    );

    // Subscribe before the initial scan so changes made during it are not lost.
    scanner.ensure_directory().map_err(bundle_error)?;
    let channel = if dir.watch {
        let backend = if watcher.use_polling {
            WatchBackend::Polling {
                interval: watcher.poll_interval(),
            }
        } else {
            WatchBackend::Native
        };
        match NotifyChannel::open(&directory, backend) {
            Ok(channel) => Some(channel),
            Err(e) => {
                tracing::error!(
                    kind = registry.kind(),
                    directory = ?directory,
                    error = %e,
                    "Could not watch bundle directory, hot reload disabled"
                );
                None
            }
        }
    } else {
        None
    };

    let reports = scanner.scan_all().map_err(bundle_error)?;
    tracing::info!(
        kind = registry.kind(),
        directory = ?directory,
        bundles = reports.len(),
        registered = reports.iter().map(|r| r.registered.len()).sum::<usize>(),
        "Initial bundle scan complete"
    );

    if let Some(channel) = channel {
        match DirectoryWatcher::spawn(Arc::clone(&scanner), channel, watcher.debounce()) {
            Ok(started) => watchers.push(started),
            Err(e) => tracing::error!(
                kind = registry.kind(),
                error = %e,
                "Could not start watcher thread, hot reload disabled"
            ),
        }
    }

    Ok(Some(scanner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::resolver::ProviderTable;
    use crate::http::method::Method;

    fn config_in(dir: &std::path::Path) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.routes.directory = Some(dir.join("route"));
        config.security.directory = Some(dir.join("security"));
        config.routes.watch = false;
        config.security.watch = false;
        config
    }

    #[test]
    fn test_bootstrap_creates_directories_and_ping() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let services = bootstrap(&config, Arc::new(ProviderTable::with_defaults())).unwrap();

        assert!(tmp.path().join("route").is_dir());
        assert!(tmp.path().join("security").is_dir());
        let response = services.dispatcher.respond(Request::new(Method::Get, "/ping"));
        assert_eq!(response.body().as_ref(), b"pong");
        assert!(services.running_watchers().is_empty());
    }

    #[test]
    fn test_disabled_sections() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_in(tmp.path());
        config.ping.enabled = false;
        config.security.enabled = false;
        let services = bootstrap(&config, Arc::new(ProviderTable::new())).unwrap();

        assert!(services.security_scanner.is_none());
        assert!(services.route_scanner.is_some());
        assert!(services.dispatcher.routes().is_empty());
    }

    #[test]
    fn test_unusable_directory_fails_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_in(tmp.path());
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        config.routes.directory = Some(file);
        let result = bootstrap(&config, Arc::new(ProviderTable::new()));
        assert!(matches!(result, Err(StartupError::Bundle { .. })));
    }
}
