//! Bundle scanning.
//!
//! # Responsibilities
//! - Find bundle archives in a directory and read their metadata files
//! - Resolve each entry's provider and register the resulting mapping
//! - Remember which bundle registered what, so removal can reverse it
//!
//! # Data Flow
//! ```text
//! bundle.zip
//!     → reader thread (bounded by scan_timeout)
//!     → metadata files under metadata_dir (*.json, *.toml)
//!     → per entry: conflict check → resolve provider → Mapping::new → registry.register
//!     → ledger[bundle][metadata file] = registered mappings
//! ```
//!
//! # Design Decisions
//! - Failures are isolated per entry and per metadata file; a bad bundle never stops a scan
//! - A uri held by an enabled mapping is skipped before its provider is resolved
//! - Removal unregisters the exact mapping instances the bundle registered

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use regex::Regex;
use thiserror::Error;

use crate::bundle::metadata::{Entry, MetadataDocument, MetadataError, MetadataFormat, MAX_METADATA_BYTES};
use crate::bundle::resolver::{resolve_as, ProviderHandler, ResolutionError, Resolver};
use crate::observability::metrics;
use crate::routing::mapping::Mapping;
use crate::routing::matcher::MatchCompilationError;
use crate::routing::registry::Registry;
use crate::routing::uri::normalize;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("I/O error on bundle {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("bundle {path:?} is not a readable archive: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("reading bundle {path:?} took longer than {timeout:?}")]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("bundle path {0:?} has no file name")]
    InvalidName(PathBuf),

    #[error("invalid bundle glob {glob:?}: {source}")]
    Glob {
        glob: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Template(#[from] MatchCompilationError),
}

/// Where to look for bundles and how to read them.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub directory: PathBuf,
    pub bundle_glob: String,
    pub metadata_dir: String,
    pub scan_timeout: Duration,
}

/// Outcome of scanning one bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub bundle: String,
    pub registered: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: usize,
}

impl ScanReport {
    fn new(bundle: &str) -> Self {
        Self {
            bundle: bundle.to_string(),
            ..Self::default()
        }
    }
}

/// metadata file → mappings it registered
type BundleEntries<H> = BTreeMap<String, Vec<Arc<Mapping<H>>>>;

/// Registers the contents of a directory of bundles into one registry.
pub struct BundleScanner<H: ProviderHandler> {
    registry: Arc<Registry<H>>,
    resolver: Arc<dyn Resolver>,
    directory: PathBuf,
    glob: Regex,
    metadata_dir: String,
    scan_timeout: Duration,
    ledger: DashMap<String, BundleEntries<H>>,
}

impl<H: ProviderHandler> BundleScanner<H> {
    pub fn new(
        registry: Arc<Registry<H>>,
        resolver: Arc<dyn Resolver>,
        settings: ScanSettings,
    ) -> Result<Self, BundleError> {
        let glob = glob_to_regex(&settings.bundle_glob).map_err(|source| BundleError::Glob {
            glob: settings.bundle_glob.clone(),
            source,
        })?;

        Ok(Self {
            registry,
            resolver,
            directory: settings.directory,
            glob,
            metadata_dir: settings.metadata_dir.trim_matches('/').to_string(),
            scan_timeout: settings.scan_timeout,
            ledger: DashMap::new(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn registry(&self) -> &Arc<Registry<H>> {
        &self.registry
    }

    /// Registry kind label (`route` or `security`).
    pub fn kind(&self) -> &'static str {
        self.registry.kind()
    }

    /// True when `path`'s file name matches the bundle glob.
    pub fn is_bundle(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.glob.is_match(name))
    }

    /// Names of the bundles currently recorded in the ledger.
    pub fn bundles(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ledger.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Uris a bundle registered that are still live, in metadata-file order.
    pub fn registered_by(&self, bundle: &str) -> Vec<String> {
        self.ledger
            .get(bundle)
            .map(|files| {
                files
                    .values()
                    .flatten()
                    .map(|mapping| mapping.uri().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Create the bundle directory if it is missing.
    pub fn ensure_directory(&self) -> Result<(), BundleError> {
        if !self.directory.exists() {
            fs::create_dir_all(&self.directory).map_err(|source| BundleError::Io {
                path: self.directory.clone(),
                source,
            })?;
            tracing::info!(kind = self.kind(), directory = ?self.directory, "Created bundle directory");
        }
        Ok(())
    }

    /// Scan every bundle in the directory, creating the directory if it is missing.
    pub fn scan_all(&self) -> Result<Vec<ScanReport>, BundleError> {
        self.ensure_directory()?;
        let bundles = self.list_bundles()?;
        Ok(bundles.iter().filter_map(|path| self.scan_logged(path)).collect())
    }

    /// (Re)scan one bundle. Its previous registrations are reversed first.
    pub fn scan(&self, path: &Path) -> Result<ScanReport, BundleError> {
        let name = bundle_name(path)?;
        self.remove_by_name(&name);

        let files = match self.read_bundle(path) {
            Ok(files) => files,
            Err(e) => {
                metrics::record_bundle_scan(self.kind(), "error");
                return Err(e);
            }
        };

        let mut report = ScanReport::new(&name);
        let mut entries: BundleEntries<H> = BTreeMap::new();

        for (file, bytes) in files {
            let document = match MetadataDocument::parse(&file, &bytes) {
                Ok(document) => document,
                Err(e) => {
                    tracing::error!(kind = self.kind(), bundle = %name, file = %file, error = %e, "Malformed metadata file");
                    report.failed += 1;
                    continue;
                }
            };

            let mut registered = Vec::new();
            for entry in &document.entries {
                match self.register_entry(&name, &file, entry) {
                    Ok(Some(mapping)) => {
                        report.registered.push(mapping.uri().to_string());
                        registered.push(mapping);
                    }
                    Ok(None) => report.skipped.push(normalize(&entry.uri)),
                    Err(e) => {
                        tracing::error!(
                            kind = self.kind(),
                            bundle = %name,
                            file = %file,
                            uri = %entry.uri,
                            provider = %entry.provider,
                            error = %e,
                            "Could not register entry"
                        );
                        report.failed += 1;
                    }
                }
            }
            if !registered.is_empty() {
                entries.insert(file, registered);
            }
        }

        self.ledger.insert(name.clone(), entries);
        metrics::record_bundle_scan(self.kind(), "ok");
        tracing::info!(
            kind = self.kind(),
            bundle = %name,
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            failed = report.failed,
            "Scanned bundle"
        );
        Ok(report)
    }

    /// Unregister everything `path`'s bundle registered. Returns the removed uris.
    pub fn remove(&self, path: &Path) -> Vec<String> {
        match bundle_name(path) {
            Ok(name) => self.remove_by_name(&name),
            Err(e) => {
                tracing::warn!(kind = self.kind(), error = %e, "Ignoring removal");
                Vec::new()
            }
        }
    }

    /// Reconcile the ledger with the directory: forget vanished bundles, rescan the rest.
    pub fn rescan_all(&self) -> Result<Vec<ScanReport>, BundleError> {
        let present = self.list_bundles()?;
        let present_names: Vec<String> = present
            .iter()
            .filter_map(|path| bundle_name(path).ok())
            .collect();

        for known in self.bundles() {
            if !present_names.contains(&known) {
                self.remove_by_name(&known);
            }
        }

        Ok(present.iter().filter_map(|path| self.scan_logged(path)).collect())
    }

    fn scan_logged(&self, path: &Path) -> Option<ScanReport> {
        match self.scan(path) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(kind = self.kind(), bundle = ?path, error = %e, "Skipping unreadable bundle");
                None
            }
        }
    }

    fn remove_by_name(&self, name: &str) -> Vec<String> {
        let Some((_, files)) = self.ledger.remove(name) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        for mapping in files.values().flatten() {
            if self.registry.unregister_mapping(mapping) {
                removed.push(mapping.uri().to_string());
            }
        }
        tracing::info!(kind = self.kind(), bundle = %name, removed = removed.len(), "Removed bundle");
        removed
    }

    fn register_entry(
        &self,
        bundle: &str,
        file: &str,
        entry: &Entry,
    ) -> Result<Option<Arc<Mapping<H>>>, BundleError> {
        let uri = normalize(&entry.uri);
        if let Some(existing) = self.registry.get(&uri) {
            if existing.is_enabled() {
                tracing::warn!(
                    kind = self.kind(),
                    bundle = %bundle,
                    file = %file,
                    uri = %uri,
                    "Ignoring entry, uri is already registered"
                );
                return Ok(None);
            }
        }

        let options = entry.options()?;
        let handler = resolve_as::<H>(self.resolver.as_ref(), &entry.provider)?;
        let mapping = Mapping::new(&uri, handler, options)?;
        Ok(self.registry.register(mapping))
    }

    fn list_bundles(&self) -> Result<Vec<PathBuf>, BundleError> {
        let io_error = |source| BundleError::Io {
            path: self.directory.clone(),
            source,
        };
        let mut bundles = Vec::new();
        for entry in fs::read_dir(&self.directory).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() && self.is_bundle(&path) {
                bundles.push(path);
            }
        }
        bundles.sort();
        Ok(bundles)
    }

    /// Read metadata files on a helper thread so a stuck read cannot stall the scanner.
    fn read_bundle(&self, path: &Path) -> Result<Vec<(String, Vec<u8>)>, BundleError> {
        let (tx, rx) = mpsc::channel();
        let owned = path.to_path_buf();
        let prefix = format!("{}/", self.metadata_dir);

        thread::Builder::new()
            .name("bundle-reader".to_string())
            .spawn(move || {
                let _ = tx.send(read_metadata_files(&owned, &prefix));
            })
            .map_err(|source| BundleError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        match rx.recv_timeout(self.scan_timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(BundleError::Timeout {
                path: path.to_path_buf(),
                timeout: self.scan_timeout,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(BundleError::Io {
                path: path.to_path_buf(),
                source: io::Error::other("bundle reader exited without a result"),
            }),
        }
    }
}

fn read_metadata_files(path: &Path, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, BundleError> {
    let archive_error = |source| BundleError::Archive {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|source| BundleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(archive_error)?;

    let mut files = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(archive_error)?;
        let name = entry.name().trim_start_matches('/').to_string();
        if entry.is_dir() || !name.starts_with(prefix) || MetadataFormat::from_name(&name).is_none() {
            continue;
        }

        // One byte over the limit is enough for the parser to reject it.
        let mut bytes = Vec::new();
        entry
            .take(MAX_METADATA_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|source| BundleError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        files.push((name, bytes));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// `*.zip` style glob to an anchored regex over a file name.
fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}

fn bundle_name(path: &Path) -> Result<String, BundleError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| BundleError::InvalidName(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use crate::bundle::resolver::ProviderTable;
    use crate::http::method::Method;
    use crate::http::request::Request;
    use crate::routing::mapping::{MappingOptions, RouteHandler};
    use crate::routing::registry::RouteRegistry;

    fn write_bundle(dir: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        for (file, content) in files {
            zip.start_file(*file, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    fn scanner(dir: &Path) -> BundleScanner<RouteHandler> {
        let resolver = ProviderTable::with_defaults()
            .with_route("hello", |_| crate::http::response::Response::ok().text("hello"));
        BundleScanner::new(
            Arc::new(RouteRegistry::new("route")),
            Arc::new(resolver),
            ScanSettings {
                directory: dir.to_path_buf(),
                bundle_glob: "*.zip".to_string(),
                metadata_dir: "META-INF/route".to_string(),
                scan_timeout: Duration::from_secs(5),
            },
        )
        .unwrap()
    }

    fn entries(uris: &[(&str, &str)]) -> String {
        let list: Vec<String> = uris
            .iter()
            .map(|(uri, provider)| format!(r#"{{"uri": "{uri}", "provider": "{provider}"}}"#))
            .collect();
        format!(r#"{{"entries": [{}]}}"#, list.join(","))
    }

    #[test]
    fn test_glob() {
        let regex = glob_to_regex("*.zip").unwrap();
        assert!(regex.is_match("routes.zip"));
        assert!(!regex.is_match("routes.zip.tmp"));
        assert!(!regex.is_match("routesXzip"));
    }

    #[test]
    fn test_scan_registers_entries() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(
            dir.path(),
            "a.zip",
            &[
                ("META-INF/route/routes.json", &entries(&[("/hello", "hello"), ("/ping", "pong")])),
                ("README.txt", "ignored"),
            ],
        );
        let scanner = scanner(dir.path());
        let reports = scanner.scan_all().unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].registered, vec!["/hello", "/ping"]);
        assert!(scanner.registry().lookup("/hello").is_some());
        assert_eq!(scanner.bundles(), vec!["a.zip"]);
    }

    #[test]
    fn test_bad_entries_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(
            dir.path(),
            "a.zip",
            &[
                ("META-INF/route/bad.json", "{not json"),
                ("META-INF/route/good.json", &entries(&[("/ok", "pong"), ("/missing", "nope"), ("/bad/(", "pong")])),
            ],
        );
        let scanner = scanner(dir.path());
        let report = scanner.scan(&dir.path().join("a.zip")).unwrap();

        assert_eq!(report.registered, vec!["/ok"]);
        assert_eq!(report.failed, 3);
        assert_eq!(scanner.registry().len(), 1);
    }

    #[test]
    fn test_conflicts_across_bundles_first_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), "a.zip", &[("META-INF/route/r.json", &entries(&[("/a", "pong")]))]);
        write_bundle(dir.path(), "b.zip", &[("META-INF/route/r.json", &entries(&[("/a", "hello")]))]);
        let scanner = scanner(dir.path());
        let reports = scanner.scan_all().unwrap();

        assert_eq!(reports[0].registered, vec!["/a"]);
        assert_eq!(reports[1].skipped, vec!["/a"]);
        let (mapping, _) = scanner.registry().lookup("/a").unwrap();
        let response = (mapping.handler())(&Request::new(Method::Get, "/a"));
        assert_eq!(response.body().as_ref(), b"pong");
    }

    #[test]
    fn test_remove_and_rescan() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = write_bundle(dir.path(), "a.zip", &[("META-INF/route/r.json", &entries(&[("/a", "pong")]))]);
        let scanner = scanner(dir.path());
        scanner.scan_all().unwrap();

        // A rescan of the same bundle replaces its own registrations.
        let report = scanner.scan(&bundle).unwrap();
        assert_eq!(report.registered, vec!["/a"]);

        assert_eq!(scanner.remove(&bundle), vec!["/a"]);
        assert!(scanner.registry().lookup("/a").is_none());
        assert!(scanner.bundles().is_empty());
    }

    #[test]
    fn test_removal_spares_replacement_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = write_bundle(
            dir.path(),
            "a.zip",
            &[("META-INF/route/r.json", r#"{"entries": [{"uri": "/a", "provider": "pong", "enabled": false}]}"#)],
        );
        let scanner = scanner(dir.path());
        scanner.scan_all().unwrap();

        let handler: RouteHandler = Arc::new(|_: &Request| crate::http::response::Response::ok());
        scanner
            .registry()
            .register(Mapping::new("/a", handler, MappingOptions::default()).unwrap())
            .unwrap();

        assert!(scanner.remove(&bundle).is_empty());
        assert!(scanner.registry().lookup("/a").is_some());
    }

    #[test]
    fn test_rescan_all_forgets_deleted_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_bundle(dir.path(), "a.zip", &[("META-INF/route/r.json", &entries(&[("/a", "pong")]))]);
        write_bundle(dir.path(), "b.zip", &[("META-INF/route/r.json", &entries(&[("/b", "pong")]))]);
        let scanner = scanner(dir.path());
        scanner.scan_all().unwrap();

        fs::remove_file(a).unwrap();
        scanner.rescan_all().unwrap();

        assert!(scanner.registry().lookup("/a").is_none());
        assert!(scanner.registry().lookup("/b").is_some());
        assert_eq!(scanner.bundles(), vec!["b.zip"]);
    }

    #[test]
    fn test_unreadable_bundle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.zip");
        fs::write(&path, b"not a zip").unwrap();
        let scanner = scanner(dir.path());

        assert!(matches!(scanner.scan(&path), Err(BundleError::Archive { .. })));
        assert!(scanner.scan_all().unwrap().is_empty());
    }
}
