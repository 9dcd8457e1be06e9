//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hotroute::bundle::ProviderTable;
use hotroute::conditional::EntityTag;
use hotroute::config::ServerConfig;
use hotroute::http::{HttpServer, Response};
use hotroute::lifecycle::{bootstrap, Services, Shutdown};
use zip::write::SimpleFileOptions;

pub const ROUTE_META: &str = "META-INF/route";
pub const SECURITY_META: &str = "META-INF/security";

/// Write a zip bundle holding `files` (archive path → content).
pub fn write_bundle(dir: &Path, name: &str, files: &[(String, String)]) -> PathBuf {
    let staging = dir.join(format!(".{name}.partial"));
    {
        let mut zip = zip::ZipWriter::new(File::create(&staging).unwrap());
        for (file, content) in files {
            zip.start_file(file.as_str(), SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    // Rename so a watcher never sees a half-written archive.
    let path = dir.join(name);
    std::fs::rename(&staging, &path).unwrap();
    path
}

/// JSON metadata document; each entry is a raw JSON object.
pub fn metadata(entries: &[&str]) -> String {
    format!(r#"{{"entries": [{}]}}"#, entries.join(","))
}

/// Single-file route bundle.
pub fn route_bundle(dir: &Path, name: &str, entries: &[&str]) -> PathBuf {
    write_bundle(dir, name, &[(format!("{ROUTE_META}/routes.json"), metadata(entries))])
}

/// Single-file security bundle.
pub fn security_bundle(dir: &Path, name: &str, entries: &[&str]) -> PathBuf {
    write_bundle(dir, name, &[(format!("{SECURITY_META}/security.json"), metadata(entries))])
}

/// Handlers every test bundle can name.
pub fn providers() -> ProviderTable {
    ProviderTable::with_defaults()
        .with_route("hello", |_| Response::ok().text("hello"))
        .with_route("user", |request| {
            let id = request.params().get("id").unwrap_or("?").to_string();
            Response::ok().text(format!("user {id}"))
        })
        .with_route("tagged", |request| {
            let tag = EntityTag::strong("v1");
            match request.preconditions().evaluate_tag(&tag) {
                Some(response) => response,
                None => Response::ok().text("tagged").tag(&tag),
            }
        })
        .with_route("created", |_| Response::no_content())
        .with_security("token", |request| {
            request.headers().get("x-token").is_some_and(|v| v == "secret")
        })
}

/// Config rooted in `dir` with watchers off.
pub fn config_in(dir: &Path) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.routes.directory = Some(dir.join("route"));
    config.security.directory = Some(dir.join("security"));
    config.routes.watch = false;
    config.security.watch = false;
    config
}

/// A running server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub services: Services,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
        self.services.stop_watchers();
    }
}

pub async fn start_server(config: ServerConfig) -> TestServer {
    let services = bootstrap(&config, Arc::new(providers())).unwrap();
    let listener = tokio::net::TcpListener::bind(&config.listener.bind_address)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(Arc::new(services.dispatcher.clone()), &config.listener);
    let signal = shutdown.signal();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    TestServer {
        addr,
        shutdown,
        services,
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    condition()
}
