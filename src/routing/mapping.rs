//! Route and security mappings.

use std::fmt;
use std::sync::Arc;

use crate::http::media_type::MediaType;
use crate::http::method::Method;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::routing::matcher::{compile, MatchCompilationError, UrlMatch, UrlMatcher};
use crate::routing::uri::normalize;

/// Route handler: answers a request.
pub type RouteHandler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Security handler: decides whether a request is authorized.
pub type SecurityHandler = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Optional fields for [`Mapping::new`]; everything defaults to "unrestricted, enabled".
#[derive(Debug, Clone, Default)]
pub struct MappingOptions {
    pub enabled: Option<bool>,
    pub methods: Vec<Method>,
    pub media_types: Vec<MediaType>,
}

/// An immutable `(uri, matcher, handler)` record.
pub struct Mapping<H> {
    uri: String,
    enabled: bool,
    matcher: Box<dyn UrlMatcher>,
    methods: Vec<Method>,
    media_types: Vec<MediaType>,
    handler: H,
}

impl<H> Mapping<H> {
    pub fn new(uri: &str, handler: H, options: MappingOptions) -> Result<Self, MatchCompilationError> {
        let uri = normalize(uri);
        let matcher = compile(&uri)?;

        let mut methods = options.methods;
        methods.sort();
        methods.dedup();

        Ok(Self {
            uri,
            enabled: options.enabled.unwrap_or(true),
            matcher,
            methods,
            media_types: options.media_types,
            handler,
        })
    }

    /// Enabled mapping with no method or media restrictions.
    pub fn simple(uri: &str, handler: H) -> Result<Self, MatchCompilationError> {
        Self::new(uri, handler, MappingOptions::default())
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn matcher(&self) -> &dyn UrlMatcher {
        self.matcher.as_ref()
    }

    pub fn match_path(&self, path: &str) -> Option<UrlMatch> {
        self.matcher.match_path(path)
    }

    /// Allowed methods; empty allows all.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Accepted media types; empty accepts all.
    pub fn media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    pub fn allows_method(&self, method: Method) -> bool {
        self.methods.is_empty() || self.methods.contains(&method)
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H> fmt::Debug for Mapping<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("uri", &self.uri)
            .field("enabled", &self.enabled)
            .field("matcher", &self.matcher)
            .field("methods", &self.methods)
            .field("media_types", &self.media_types)
            .finish_non_exhaustive()
    }
}
