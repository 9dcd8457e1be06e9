//! Request handed to security predicates and route handlers.
//!
//! # Responsibilities
//! - Hold the normalized path, method, headers and body of an inbound request
//! - Collect parameters from the query string, url-encoded POST bodies and path templates
//! - Expose the conditional-request evaluator bound to this request
//!
//! # Design Decisions
//! - Built by the transport adapter; handlers only ever see `&Request`
//! - Parameters are a multimap in arrival order (query, body, then path)

use std::time::SystemTime;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName};
use percent_encoding::percent_decode_str;

use crate::conditional::Preconditions;
use crate::http::media_type::MediaType;
use crate::http::method::{Method, Version};
use crate::routing::uri::normalize;

/// Ordered name/value multimap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value recorded for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn extend_from_urlencoded(&mut self, input: &[u8]) {
        for (name, value) in url::form_urlencoded::parse(input) {
            self.add(name, value);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    version: Version,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    params: Params,
    content: Bytes,
    keep_alive: bool,
}

impl Request {
    /// Build a request for `method` on `target` (path with optional `?query`).
    /// The path is percent-decoded before normalization.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };
        let mut params = Params::new();
        if let Some(query) = &query {
            params.extend_from_urlencoded(query.as_bytes());
        }

        Self {
            method,
            version: Version::default(),
            path: normalize(&percent_decode_str(path).decode_utf8_lossy()),
            query,
            headers: HeaderMap::new(),
            params,
            content: Bytes::new(),
            keep_alive: true,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Add one header; invalid values are ignored.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.append(name, value);
        }
        self
    }

    /// Attach a body. Url-encoded POST bodies also contribute parameters.
    pub fn with_content(mut self, content: impl Into<Bytes>) -> Self {
        self.content = content.into();
        let is_form = self
            .content_type()
            .is_some_and(|m| m.kind() == "application" && m.subtype() == "x-www-form-urlencoded");
        if self.method == Method::Post && is_form {
            let content = self.content.clone();
            self.params.extend_from_urlencoded(&content);
        }
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Normalized path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is valid visible ASCII.
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Parsed `Date` header.
    pub fn date(&self) -> Option<SystemTime> {
        self.header(&header::DATE)
            .and_then(|value| httpdate::parse_http_date(value).ok())
    }

    /// Parsed `Content-Type`; malformed values read as absent.
    pub fn content_type(&self) -> Option<MediaType> {
        self.header(&header::CONTENT_TYPE)
            .and_then(|value| MediaType::parse(value).ok())
    }

    /// Media types listed in `Accept`.
    pub fn accept(&self) -> Vec<MediaType> {
        self.headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(MediaType::parse_list)
            .collect()
    }

    /// Conditional-request evaluation against this request's headers.
    pub fn preconditions(&self) -> Preconditions<'_> {
        Preconditions::new(self.method, &self.headers)
    }
}
