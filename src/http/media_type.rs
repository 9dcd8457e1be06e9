//! Media type parsing and compatibility.
//!
//! # Design Decisions
//! - Type and subtype are lowercased; the original input is kept for display
//! - Equality follows the original input string, not the parsed parts
//! - Syntax is checked by `mime`; only the `charset` parameter is interpreted
//! - Repeated charsets must agree, which `mime` itself does not check

use std::fmt;
use std::str::FromStr;

use mime::Mime;
use thiserror::Error;

const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaTypeError {
    #[error("This input {0} is not a well-formed media type.")]
    Malformed(String),

    #[error("This input {0} has multiple different charsets.")]
    ConflictingCharsets(String),
}

/// A parsed `type/subtype` media type with an optional charset.
#[derive(Debug, Clone)]
pub struct MediaType {
    raw: String,
    kind: String,
    subtype: String,
    charset: Option<String>,
}

impl MediaType {
    /// `*/*`
    pub fn wildcard() -> Self {
        Self::static_type("*/*", "*", "*", None)
    }

    /// `text/plain`
    pub fn text() -> Self {
        Self::static_type("text/plain", "text", "plain", None)
    }

    /// `text/plain;charset=utf-8`
    pub fn text_utf8() -> Self {
        Self::static_type("text/plain;charset=utf-8", "text", "plain", Some("utf-8"))
    }

    /// `application/json`
    pub fn json() -> Self {
        Self::static_type("application/json", "application", "json", None)
    }

    fn static_type(raw: &str, kind: &str, subtype: &str, charset: Option<&str>) -> Self {
        Self {
            raw: raw.to_string(),
            kind: kind.to_string(),
            subtype: subtype.to_string(),
            charset: charset.map(str::to_string),
        }
    }

    /// Parse a media type such as `text/html; charset="UTF-8"`.
    pub fn parse(input: &str) -> Result<Self, MediaTypeError> {
        let parsed: Mime = input
            .trim()
            .parse()
            .map_err(|_| MediaTypeError::Malformed(input.to_string()))?;

        let mut charset: Option<String> = None;
        for (name, value) in parsed.params() {
            if name != mime::CHARSET {
                continue;
            }
            let value = unquote(value.as_str());
            match &charset {
                Some(existing) if !existing.eq_ignore_ascii_case(value) => {
                    return Err(MediaTypeError::ConflictingCharsets(input.to_string()));
                }
                _ => charset = Some(value.to_string()),
            }
        }

        Ok(Self {
            raw: input.to_string(),
            kind: parsed.type_().as_str().to_ascii_lowercase(),
            subtype: parsed.subtype().as_str().to_ascii_lowercase(),
            charset,
        })
    }

    /// Parse a comma separated list such as an `Accept` header, skipping bad members.
    pub fn parse_list(input: &str) -> Vec<MediaType> {
        input
            .split(',')
            .map(str::trim)
            .filter(|member| !member.is_empty())
            .filter_map(|member| MediaType::parse(member).ok())
            .collect()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn is_wildcard(&self) -> bool {
        self.kind == WILDCARD && self.subtype == WILDCARD
    }

    /// True when either side's wildcards cover the other.
    pub fn is_compatible(&self, other: &MediaType) -> bool {
        let either_kind_wild = self.kind == WILDCARD || other.kind == WILDCARD;
        let either_subtype_wild = self.subtype == WILDCARD || other.subtype == WILDCARD;
        let same_kind = self.kind.eq_ignore_ascii_case(&other.kind);

        (either_kind_wild && either_subtype_wild)
            || (same_kind && either_subtype_wild)
            || (same_kind && self.subtype.eq_ignore_ascii_case(&other.subtype))
    }

    /// Same type and subtype, ignoring parameters.
    pub fn is_similar(&self, other: &MediaType) -> bool {
        self.kind == other.kind && self.subtype == other.subtype
    }
}

/// Strips double quotes, then the single quotes some clients put around charsets.
fn unquote(value: &str) -> &str {
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    match value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
        Some(inner) if !inner.is_empty() => inner,
        _ => value,
    }
}

impl PartialEq for MediaType {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for MediaType {}

impl std::hash::Hash for MediaType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaType::parse(s)
    }
}
