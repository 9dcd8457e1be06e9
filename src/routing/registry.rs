//! Case-insensitive mapping registries.
//!
//! # Responsibilities
//! - Store route and security mappings keyed by normalized uri
//! - Enforce one live (enabled) mapping per uri
//! - Find the first enabled mapping whose matcher accepts a path
//!
//! # Design Decisions
//! - Readers load an immutable snapshot (`ArcSwap`) and never block on writers
//! - Writers are serialized by a mutex and publish a fresh copy of the map
//! - Lookup is a linear walk in key order; there is no specificity ranking

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;

use crate::http::request::Request;
use crate::routing::mapping::{Mapping, RouteHandler, SecurityHandler};
use crate::routing::matcher::UrlMatch;
use crate::routing::uri::normalize;

type Entries<H> = BTreeMap<String, Arc<Mapping<H>>>;

pub type RouteRegistry = Registry<RouteHandler>;
pub type SecurityRegistry = Registry<SecurityHandler>;

pub struct Registry<H> {
    kind: &'static str,
    entries: ArcSwap<Entries<H>>,
    write_lock: Mutex<()>,
}

impl<H> Registry<H> {
    /// Empty registry; `kind` labels log lines and metrics (`route`, `security`).
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: ArcSwap::from_pointee(BTreeMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Insert `mapping`, replacing a disabled entry for the same uri.
    ///
    /// Returns `None` without touching the registry when an enabled mapping
    /// already holds the uri.
    pub fn register(&self, mapping: Mapping<H>) -> Option<Arc<Mapping<H>>> {
        let key = registry_key(mapping.uri());
        let _guard = self.lock();

        let current = self.entries.load();
        if let Some(existing) = current.get(&key) {
            if existing.is_enabled() {
                tracing::warn!(
                    kind = self.kind,
                    uri = %mapping.uri(),
                    "Mapping already registered and enabled, ignoring new registration"
                );
                return None;
            }
        }

        let mapping = Arc::new(mapping);
        let mut next = Entries::clone(&current);
        next.insert(key, Arc::clone(&mapping));
        self.publish(next);

        tracing::debug!(
            kind = self.kind,
            uri = %mapping.uri(),
            enabled = mapping.is_enabled(),
            "Registered mapping"
        );
        Some(mapping)
    }

    /// Remove whatever is registered under `uri`.
    pub fn unregister(&self, uri: &str) -> Option<Arc<Mapping<H>>> {
        let key = registry_key(uri);
        let _guard = self.lock();

        let current = self.entries.load();
        if !current.contains_key(&key) {
            return None;
        }
        let mut next = Entries::clone(&current);
        let removed = next.remove(&key);
        self.publish(next);

        tracing::debug!(kind = self.kind, uri = %uri, "Unregistered mapping");
        removed
    }

    /// Remove `mapping` only if it is still the registered instance for its uri.
    pub fn unregister_mapping(&self, mapping: &Arc<Mapping<H>>) -> bool {
        let key = registry_key(mapping.uri());
        let _guard = self.lock();

        let current = self.entries.load();
        match current.get(&key) {
            Some(existing) if Arc::ptr_eq(existing, mapping) => {}
            _ => return false,
        }
        let mut next = Entries::clone(&current);
        next.remove(&key);
        self.publish(next);

        tracing::debug!(kind = self.kind, uri = %mapping.uri(), "Unregistered mapping");
        true
    }

    /// The mapping registered under exactly `uri` (case-insensitive), enabled or not.
    pub fn get(&self, uri: &str) -> Option<Arc<Mapping<H>>> {
        self.entries.load().get(&registry_key(uri)).cloned()
    }

    /// First enabled mapping, in key order, whose matcher accepts `path`.
    pub fn lookup(&self, path: &str) -> Option<(Arc<Mapping<H>>, UrlMatch)> {
        let entries = self.entries.load();
        entries
            .values()
            .filter(|mapping| mapping.is_enabled())
            .find_map(|mapping| {
                mapping
                    .match_path(path)
                    .map(|found| (Arc::clone(mapping), found))
            })
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.entries.load().contains_key(&registry_key(uri))
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// Registered uris in lookup order.
    pub fn uris(&self) -> Vec<String> {
        self.entries
            .load()
            .values()
            .map(|mapping| mapping.uri().to_string())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guard protects no data, so a poisoned lock is still usable.
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, next: Entries<H>) {
        let size = next.len();
        self.entries.store(Arc::new(next));
        crate::observability::metrics::record_registry_size(self.kind, size);
    }
}

impl Registry<SecurityHandler> {
    /// Default-allow: only an enabled, matching security mapping can deny.
    pub fn is_authorized(&self, request: &Request) -> bool {
        match self.lookup(request.path()) {
            Some((mapping, _)) => (mapping.handler())(request),
            None => true,
        }
    }
}

impl<H> std::fmt::Debug for Registry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("uris", &self.uris())
            .finish()
    }
}

fn registry_key(uri: &str) -> String {
    normalize(uri).to_lowercase()
}
