//! Conditional-request evaluation (RFC 7232).
//!
//! Each evaluation returns `None` when the request may proceed normally, or
//! `Some(response)` carrying a 304 or 412 the handler should send instead.
//!
//! Combined order (RFC 7232 §6):
//! ```text
//! If-Match            → 412 on mismatch
//! If-Unmodified-Since → 412 when modified after the date
//! If-None-Match       → 304 (GET/HEAD) or 412 on match; present but unmatched skips the next step
//! If-Modified-Since   → 304 when not modified after the date (GET/HEAD only)
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use http::header::{self, HeaderMap, HeaderName};

use crate::conditional::entity_tag::EntityTag;
use crate::http::method::Method;
use crate::http::response::Response;

/// Precondition evaluator bound to one request's method and headers.
#[derive(Debug, Clone, Copy)]
pub struct Preconditions<'a> {
    method: Method,
    headers: &'a HeaderMap,
}

impl<'a> Preconditions<'a> {
    pub fn new(method: Method, headers: &'a HeaderMap) -> Self {
        Self { method, headers }
    }

    /// If-Match against the current entity tag, strong comparison.
    pub fn evaluate_if_match(&self, tag: &EntityTag) -> Option<Response> {
        let header = self.header(&header::IF_MATCH)?;
        // Strong comparison can never succeed for a weak current tag.
        if tag.is_weak() {
            return Some(Response::precondition_failed());
        }
        let matching = EntityTag::parse_list(header);
        let matched = matching.iter().any(|m| m.is_any() || m.strong_eq(tag));
        if matched {
            None
        } else {
            Some(Response::precondition_failed())
        }
    }

    /// If-None-Match: weak comparison for GET/HEAD (304), strong otherwise (412).
    pub fn evaluate_if_none_match(&self, tag: &EntityTag) -> Option<Response> {
        let header = self.header(&header::IF_NONE_MATCH)?;
        let matching = EntityTag::parse_list(header);
        self.if_none_match_outcome(tag, &matching)
    }

    /// If-Modified-Since; only GET and HEAD are considered.
    pub fn evaluate_if_modified_since(&self, last_modified: SystemTime) -> Option<Response> {
        if !self.method.is_get_or_head() {
            return None;
        }
        let since = self.date_header(&header::IF_MODIFIED_SINCE)?;
        if round_down_millis(last_modified) <= epoch_millis(since) {
            Some(Response::not_modified(None))
        } else {
            None
        }
    }

    /// If-Unmodified-Since.
    pub fn evaluate_if_unmodified_since(&self, last_modified: SystemTime) -> Option<Response> {
        let since = self.date_header(&header::IF_UNMODIFIED_SINCE)?;
        if round_down_millis(last_modified) > epoch_millis(since) {
            Some(Response::precondition_failed())
        } else {
            None
        }
    }

    /// Entity-tag validators only: If-Match, then If-None-Match.
    pub fn evaluate_tag(&self, tag: &EntityTag) -> Option<Response> {
        self.evaluate_if_match(tag)
            .or_else(|| self.evaluate_if_none_match(tag))
    }

    /// Date validators only: If-Unmodified-Since, then If-Modified-Since.
    pub fn evaluate_last_modified(&self, last_modified: SystemTime) -> Option<Response> {
        self.evaluate_if_unmodified_since(last_modified)
            .or_else(|| self.evaluate_if_modified_since(last_modified))
    }

    /// All four preconditions in RFC 7232 §6 order.
    pub fn evaluate(&self, last_modified: SystemTime, tag: &EntityTag) -> Option<Response> {
        if let Some(response) = self.evaluate_if_match(tag) {
            return Some(response);
        }
        if let Some(response) = self.evaluate_if_unmodified_since(last_modified) {
            return Some(response);
        }
        if let Some(header) = self.header(&header::IF_NONE_MATCH) {
            let matching = EntityTag::parse_list(header);
            return self.if_none_match_outcome(tag, &matching);
        }
        self.evaluate_if_modified_since(last_modified)
            .map(|response| response.tag(tag))
    }

    /// For a resource that does not exist: any If-Match fails.
    pub fn evaluate_missing(&self) -> Option<Response> {
        self.header(&header::IF_MATCH)
            .map(|_| Response::precondition_failed())
    }

    fn if_none_match_outcome(&self, tag: &EntityTag, matching: &[EntityTag]) -> Option<Response> {
        if self.method.is_get_or_head() {
            let matched = matching.iter().any(|m| m.is_any() || m.weak_eq(tag));
            return matched.then(|| Response::not_modified(Some(tag)));
        }
        if tag.is_weak() {
            return None;
        }
        let matched = matching.iter().any(|m| m.is_any() || m.strong_eq(tag));
        matched.then(Response::precondition_failed)
    }

    fn header(&self, name: &HeaderName) -> Option<&'a str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn date_header(&self, name: &HeaderName) -> Option<SystemTime> {
        let value = self.header(name)?;
        match httpdate::parse_http_date(value) {
            Ok(time) => Some(time),
            Err(_) => {
                tracing::debug!(header = %name, value = %value, "Ignoring unparseable date precondition");
                None
            }
        }
    }
}

fn epoch_millis(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// HTTP dates have one-second resolution.
fn round_down_millis(time: SystemTime) -> u128 {
    let millis = epoch_millis(time);
    millis - millis % 1000
}
