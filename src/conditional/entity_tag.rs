//! Entity tags (`ETag`, `If-Match`, `If-None-Match` values).
//!
//! A tag is written `"value"` (strong), `W/"value"` (weak) or `*` (matches any
//! current representation). Quotes inside the value are backslash-escaped on
//! output and unescaped on input.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const ANY: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("header value ({0}) is not a valid entity tag.")]
pub struct EntityTagError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityTag {
    value: String,
    weak: bool,
}

impl EntityTag {
    pub fn new(value: impl Into<String>, weak: bool) -> Self {
        Self {
            value: value.into(),
            weak,
        }
    }

    pub fn strong(value: impl Into<String>) -> Self {
        Self::new(value, false)
    }

    pub fn weak(value: impl Into<String>) -> Self {
        Self::new(value, true)
    }

    /// The `*` sentinel.
    pub fn any() -> Self {
        Self::strong(ANY)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    pub fn is_any(&self) -> bool {
        !self.weak && self.value == ANY
    }

    /// Value and weakness both equal.
    pub fn strong_eq(&self, other: &EntityTag) -> bool {
        self == other
    }

    /// Values equal; weakness ignored.
    pub fn weak_eq(&self, other: &EntityTag) -> bool {
        self.value == other.value
    }

    pub fn parse(input: &str) -> Result<Self, EntityTagError> {
        let input = input.trim();
        if input == ANY {
            return Ok(Self::any());
        }

        let (weak, quoted) = match input.strip_prefix("W/") {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        let inner = quoted
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .ok_or_else(|| EntityTagError(input.to_string()))?;

        Ok(Self::new(unescape_quotes(inner), weak))
    }

    /// Parse a comma separated header list. Members that are not valid tags are skipped.
    pub fn parse_list(header: &str) -> Vec<EntityTag> {
        split_list(header)
            .into_iter()
            .filter_map(|member| match EntityTag::parse(member) {
                Ok(tag) => Some(tag),
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring entity tag list member");
                    None
                }
            })
            .collect()
    }
}

fn unescape_quotes(value: &str) -> String {
    value.replace("\\\"", "\"")
}

/// Split on commas that are not inside a quoted string.
fn split_list(header: &str) -> Vec<&str> {
    let mut members = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in header.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                members.push(header[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    members.push(header[start..].trim());
    members.retain(|m| !m.is_empty());
    members
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return f.write_str(ANY);
        }
        if self.weak {
            f.write_str("W/")?;
        }
        f.write_str("\"")?;
        for c in self.value.chars() {
            if c == '"' {
                f.write_str("\\")?;
            }
            write!(f, "{c}")?;
        }
        f.write_str("\"")
    }
}

impl FromStr for EntityTag {
    type Err = EntityTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityTag::parse(s)
    }
}
