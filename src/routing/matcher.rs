//! URL matching.
//!
//! # Responsibilities
//! - Compile a route template once, at registration time
//! - Match a normalized request path against it and extract parameters
//!
//! # Design Decisions
//! - Templates following the `/{name}` segment grammar become `TemplateMatcher`s;
//!   everything else is compiled as an anchored regex by `ExactMatcher`
//! - Matching is case-insensitive for static text, parameter values are returned as sent
//! - Matchers hold no shared state; compiling a template twice yields equal behavior

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::routing::uri::{is_path_param_uri, normalize};

#[derive(Debug, Error)]
pub enum MatchCompilationError {
    #[error("route template {template:?} is not a valid pattern: {source}")]
    InvalidPattern {
        template: String,
        #[source]
        source: regex::Error,
    },

    #[error("route template {template:?} declares parameter `{name}` more than once")]
    DuplicateParameter { template: String, name: String },
}

/// Parameters extracted by a successful match, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlMatch {
    params: Vec<(String, String)>,
}

impl UrlMatch {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn into_params(self) -> Vec<(String, String)> {
        self.params
    }
}

/// A compiled route template.
pub trait UrlMatcher: Send + Sync + std::fmt::Debug {
    /// The template this matcher was compiled from.
    fn template(&self) -> &str;

    /// Match `path`, returning the extracted parameters.
    fn match_path(&self, path: &str) -> Option<UrlMatch>;

    fn matches(&self, path: &str) -> bool {
        self.match_path(path).is_some()
    }
}

/// Compile `template` into the matcher its shape calls for.
pub fn compile(template: &str) -> Result<Box<dyn UrlMatcher>, MatchCompilationError> {
    if is_path_param_uri(template) {
        Ok(Box::new(TemplateMatcher::new(template)?))
    } else {
        Ok(Box::new(ExactMatcher::new(template)?))
    }
}

/// Literal or regular-expression template matched against the whole path.
#[derive(Debug, Clone)]
pub struct ExactMatcher {
    template: String,
    pattern: Regex,
}

impl ExactMatcher {
    pub fn new(template: &str) -> Result<Self, MatchCompilationError> {
        let pattern = RegexBuilder::new(&format!("^(?:{template})$"))
            .case_insensitive(true)
            .build()
            .map_err(|source| MatchCompilationError::InvalidPattern {
                template: template.to_string(),
                source,
            })?;
        Ok(Self {
            template: template.to_string(),
            pattern,
        })
    }
}

impl UrlMatcher for ExactMatcher {
    fn template(&self) -> &str {
        &self.template
    }

    fn match_path(&self, path: &str) -> Option<UrlMatch> {
        let captures = self.pattern.captures(path)?;
        // Named groups in a regex template become parameters.
        let params = self
            .pattern
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|value| (name.to_string(), value.as_str().to_string()))
            })
            .collect();
        Some(UrlMatch { params })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// `/users/{id}` style template with exact segment-count matching.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    template: String,
    segments: Vec<Segment>,
}

impl TemplateMatcher {
    pub fn new(template: &str) -> Result<Self, MatchCompilationError> {
        let trimmed = normalize(template.strip_suffix('?').unwrap_or(template));

        let mut segments = Vec::new();
        for raw in split_segments(&trimmed) {
            let segment = match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => {
                    if segments.contains(&Segment::Param(name.to_string())) {
                        return Err(MatchCompilationError::DuplicateParameter {
                            template: template.to_string(),
                            name: name.to_string(),
                        });
                    }
                    Segment::Param(name.to_string())
                }
                None => Segment::Literal(raw.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }
}

impl UrlMatcher for TemplateMatcher {
    fn template(&self) -> &str {
        &self.template
    }

    fn match_path(&self, path: &str) -> Option<UrlMatch> {
        let parts = split_segments(path);
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal.eq_ignore_ascii_case(part) => {}
                Segment::Param(name) if !part.is_empty() => {
                    params.push((name.clone(), part.to_string()));
                }
                _ => return None,
            }
        }
        Some(UrlMatch { params })
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').collect()
    }
}
