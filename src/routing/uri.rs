//! URI normalization and template classification.

use std::sync::LazyLock;

use regex::Regex;

/// Segments are word tokens or `{word}` placeholders, with an optional trailing `?`.
static PATH_PARAM_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?:(?:\w+|\{\w+\})(?:/(?:\w+|\{\w+\}))*)?\??$")
        .expect("path parameter grammar is a valid regex")
});

/// Leading `/` added, one trailing `/` removed; empty input becomes `/`.
pub fn normalize(uri: &str) -> String {
    let uri = uri.trim();
    let mut normalized = if uri.starts_with('/') {
        uri.to_string()
    } else {
        format!("/{uri}")
    };
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// True when `uri` contains at least one `{name}` placeholder and otherwise
/// follows the segment grammar.
pub fn is_path_param_uri(uri: &str) -> bool {
    uri.contains('{') && PATH_PARAM_TEMPLATE.is_match(uri)
}
