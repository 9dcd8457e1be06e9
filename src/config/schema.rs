//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! Every section has defaults, so an empty file is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listener settings.
    pub listener: ListenerConfig,

    /// Route bundle directory.
    pub routes: BundleDirConfig,

    /// Security bundle directory.
    pub security: BundleDirConfig,

    /// Directory watcher tuning.
    pub watcher: WatcherConfig,

    /// Built-in health route.
    pub ping: PingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ServerConfig {
    pub fn route_dir(&self) -> PathBuf {
        self.routes.directory_or(DEFAULT_ROUTE_DIR)
    }

    pub fn security_dir(&self) -> PathBuf {
        self.security.directory_or(DEFAULT_SECURITY_DIR)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest accepted request body, in bytes.
    pub max_content_length: usize,

    /// Time allowed to read and answer one request.
    pub read_timeout_secs: u64,
}

impl ListenerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_content_length: 64 * 1024,
            read_timeout_secs: 30,
        }
    }
}

pub const DEFAULT_ROUTE_DIR: &str = "route";
pub const DEFAULT_SECURITY_DIR: &str = "security";
pub const DEFAULT_ROUTE_METADATA_DIR: &str = "META-INF/route";
pub const DEFAULT_SECURITY_METADATA_DIR: &str = "META-INF/security";

/// A watched directory of bundles (`[routes]` and `[security]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BundleDirConfig {
    /// Scan and watch this directory at all.
    pub enabled: bool,

    /// Directory holding bundles, relative to the working directory unless absolute.
    /// Defaults to `route` or `security`.
    pub directory: Option<PathBuf>,

    /// File-name glob selecting bundles.
    pub bundle_glob: String,

    /// Directory inside each bundle holding metadata files.
    /// Defaults to `META-INF/route` or `META-INF/security`.
    pub metadata_dir: Option<String>,

    /// Keep watching after the initial scan.
    pub watch: bool,

    /// Upper bound on reading one bundle.
    pub scan_timeout_secs: u64,
}

impl BundleDirConfig {
    pub fn directory_or(&self, fallback: &str) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(fallback))
    }

    pub fn metadata_dir_or(&self, fallback: &str) -> String {
        self.metadata_dir
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

impl Default for BundleDirConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            bundle_glob: "*.zip".to_string(),
            metadata_dir: None,
            watch: true,
            scan_timeout_secs: 10,
        }
    }
}

/// Directory watcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Quiet period before a changed bundle is rescanned.
    pub debounce_ms: u64,

    /// Poll the directory instead of using native notifications.
    pub use_polling: bool,

    /// Poll interval when polling.
    pub poll_interval_secs: u64,
}

impl WatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            use_polling: false,
            poll_interval_secs: 2,
        }
    }
}

/// Built-in `pong` route.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PingConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/ping".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.listener.max_content_length, 65536);
        assert_eq!(config.route_dir(), PathBuf::from("route"));
        assert_eq!(config.routes.metadata_dir_or(DEFAULT_ROUTE_METADATA_DIR), "META-INF/route");
        assert_eq!(config.security_dir(), PathBuf::from("security"));
        assert_eq!(config.security.metadata_dir_or(DEFAULT_SECURITY_METADATA_DIR), "META-INF/security");
        assert_eq!(config.watcher.debounce(), Duration::from_millis(250));
        assert!(config.ping.enabled);
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn test_partial_sections() {
        let config: ServerConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [security]
            watch = false
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.listener.read_timeout_secs, 30);
        assert!(!config.security.watch);
        assert_eq!(config.security.bundle_glob, "*.zip");
        assert_eq!(config.security_dir(), PathBuf::from("security"));
    }
}
