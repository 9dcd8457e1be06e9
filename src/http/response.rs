//! Response produced by handlers and the dispatcher.
//!
//! # Responsibilities
//! - Carry status, headers, body and media type back to the transport
//! - Offer chainable constructors for the common cases (200, 204, 304, errors)
//!
//! # Design Decisions
//! - Plain value type; the transport adapter turns it into bytes
//! - Header setters ignore values that are not valid header text instead of panicking

use std::time::SystemTime;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::conditional::EntityTag;
use crate::http::media_type::MediaType;
use crate::http::method::Method;
use crate::http::status::Status;

#[derive(Debug, Clone)]
pub struct Response {
    status: Status,
    headers: HeaderMap,
    content: Bytes,
    media_type: Option<MediaType>,
}

impl Response {
    /// Empty response with the given status.
    pub fn new(status: Status) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            content: Bytes::new(),
            media_type: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(Status::Ok)
    }

    pub fn no_content() -> Self {
        Self::new(Status::NoContent)
    }

    /// 304 carrying the current entity tag, when one is known.
    pub fn not_modified(tag: Option<&EntityTag>) -> Self {
        let response = Self::new(Status::NotModified);
        match tag {
            Some(tag) => response.tag(tag),
            None => response,
        }
    }

    pub fn precondition_failed() -> Self {
        Self::new(Status::PreconditionFailed)
    }

    /// UTF-8 text body with `text/plain;charset=utf-8`.
    pub fn text(self, body: impl Into<String>) -> Self {
        self.content(body.into()).media_type(MediaType::text_utf8())
    }

    pub fn content(mut self, body: impl Into<Bytes>) -> Self {
        self.content = body.into();
        self
    }

    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    /// Replace a header value.
    pub fn header(mut self, name: HeaderName, value: impl AsRef<str>) -> Self {
        match HeaderValue::from_str(value.as_ref()) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => tracing::warn!(header = %name, "Dropping invalid response header value"),
        }
        self
    }

    pub fn tag(self, tag: &EntityTag) -> Self {
        self.header(header::ETAG, tag.to_string())
    }

    pub fn last_modified(self, time: SystemTime) -> Self {
        self.header(header::LAST_MODIFIED, httpdate::fmt_http_date(time))
    }

    pub fn allow(self, methods: &[Method]) -> Self {
        let allowed = methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        self.header(header::ALLOW, allowed)
    }

    pub fn location(self, location: &str) -> Self {
        self.header(header::LOCATION, location)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.content
    }

    pub fn content_type(&self) -> Option<&MediaType> {
        self.media_type.as_ref()
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    pub fn into_parts(self) -> (Status, HeaderMap, Option<MediaType>, Bytes) {
        (self.status, self.headers, self.media_type, self.content)
    }
}
