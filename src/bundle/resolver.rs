//! Provider resolution.
//!
//! Bundles name their handlers with a textual provider reference. A [`Resolver`]
//! turns that reference into a callable; the default [`ProviderTable`] is an
//! indirection table from reference strings to statically compiled handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::http::request::Request;
use crate::http::response::Response;
use crate::routing::mapping::{RouteHandler, SecurityHandler};

/// Which handler signature a provider must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// `Request -> Response`
    Route,
    /// `Request -> bool`
    Security,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Route => "route",
            HandlerKind::Security => "security",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("unknown {kind} provider {provider:?}")]
    Unknown { provider: String, kind: HandlerKind },

    #[error("provider {provider:?} is not a {expected} handler")]
    KindMismatch { provider: String, expected: HandlerKind },
}

/// A resolved callable.
#[derive(Clone)]
pub enum Handler {
    Route(RouteHandler),
    Security(SecurityHandler),
}

impl Handler {
    pub fn kind(&self) -> HandlerKind {
        match self {
            Handler::Route(_) => HandlerKind::Route,
            Handler::Security(_) => HandlerKind::Security,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{:?}", self.kind())
    }
}

/// Turns a provider reference into a callable.
///
/// Resolution runs on the scanner thread, never on the request path, so
/// implementations may be slow.
pub trait Resolver: Send + Sync {
    fn resolve(&self, provider: &str, kind: HandlerKind) -> Result<Handler, ResolutionError>;
}

/// Handler types a registry can hold, tied to the kind a resolver must produce.
pub trait ProviderHandler: Clone + Send + Sync + Sized + 'static {
    const KIND: HandlerKind;

    fn from_handler(provider: &str, handler: Handler) -> Result<Self, ResolutionError>;
}

impl ProviderHandler for RouteHandler {
    const KIND: HandlerKind = HandlerKind::Route;

    fn from_handler(provider: &str, handler: Handler) -> Result<Self, ResolutionError> {
        match handler {
            Handler::Route(handler) => Ok(handler),
            Handler::Security(_) => Err(ResolutionError::KindMismatch {
                provider: provider.to_string(),
                expected: Self::KIND,
            }),
        }
    }
}

impl ProviderHandler for SecurityHandler {
    const KIND: HandlerKind = HandlerKind::Security;

    fn from_handler(provider: &str, handler: Handler) -> Result<Self, ResolutionError> {
        match handler {
            Handler::Security(handler) => Ok(handler),
            Handler::Route(_) => Err(ResolutionError::KindMismatch {
                provider: provider.to_string(),
                expected: Self::KIND,
            }),
        }
    }
}

/// Resolve `provider` into the handler type `H` expects.
pub fn resolve_as<H: ProviderHandler>(resolver: &dyn Resolver, provider: &str) -> Result<H, ResolutionError> {
    let handler = resolver.resolve(provider, H::KIND)?;
    H::from_handler(provider, handler)
}

/// In-memory table of named handlers.
#[derive(Clone, Default)]
pub struct ProviderTable {
    providers: HashMap<String, Handler>,
}

impl ProviderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table preloaded with `pong` (route), `allow` and `deny` (security).
    pub fn with_defaults() -> Self {
        Self::new()
            .with_route("pong", |_| Response::ok().text("pong"))
            .with_security("allow", |_| true)
            .with_security("deny", |_| false)
    }

    pub fn with_route<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.providers
            .insert(name.to_string(), Handler::Route(Arc::new(handler)));
        self
    }

    pub fn with_security<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.providers
            .insert(name.to_string(), Handler::Security(Arc::new(handler)));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Resolver for ProviderTable {
    fn resolve(&self, provider: &str, kind: HandlerKind) -> Result<Handler, ResolutionError> {
        let handler = self
            .providers
            .get(provider.trim())
            .ok_or_else(|| ResolutionError::Unknown {
                provider: provider.to_string(),
                kind,
            })?;
        if handler.kind() != kind {
            return Err(ResolutionError::KindMismatch {
                provider: provider.to_string(),
                expected: kind,
            });
        }
        Ok(handler.clone())
    }
}

impl fmt::Debug for ProviderTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("ProviderTable").field("providers", &names).finish()
    }
}
