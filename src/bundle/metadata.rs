//! Route and security metadata documents found inside bundles.
//!
//! A document is JSON or TOML (chosen by file extension) holding a list of entries:
//!
//! ```toml
//! [[entries]]
//! uri = "/users/{id}"
//! provider = "users.show"
//! methods = ["GET"]
//! mediaTypes = ["application/json"]
//! ```

use serde::Deserialize;
use thiserror::Error;

use crate::http::media_type::{MediaType, MediaTypeError};
use crate::http::method::{Method, UnknownMethod};
use crate::routing::mapping::MappingOptions;

/// Upper bound on a single metadata file.
pub const MAX_METADATA_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("unsupported metadata format for {0} (expected .json or .toml)")]
    UnsupportedFormat(String),

    #[error("metadata file {name} exceeds {limit} bytes")]
    TooLarge { name: String, limit: u64 },

    #[error("metadata file {name} is not valid UTF-8")]
    Encoding { name: String },

    #[error("invalid JSON metadata in {name}: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TOML metadata in {name}: {source}")]
    Toml {
        name: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("entry {uri}: {source}")]
    Method {
        uri: String,
        #[source]
        source: UnknownMethod,
    },

    #[error("entry {uri}: {source}")]
    MediaType {
        uri: String,
        #[source]
        source: MediaTypeError,
    },
}

/// Metadata serialization, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFormat {
    Json,
    Toml,
}

impl MetadataFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        let extension = name.rsplit_once('.')?.1;
        if extension.eq_ignore_ascii_case("json") {
            Some(MetadataFormat::Json)
        } else if extension.eq_ignore_ascii_case("toml") {
            Some(MetadataFormat::Toml)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataDocument {
    #[serde(alias = "routes", alias = "route", alias = "securities", alias = "security")]
    pub entries: Vec<Entry>,
}

/// One declared mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(alias = "path")]
    pub uri: String,

    pub provider: String,

    #[serde(default, alias = "enable")]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub methods: Vec<String>,

    #[serde(default, rename = "mediaTypes", alias = "media_types", alias = "medias")]
    pub media_types: Vec<String>,
}

impl Entry {
    /// Parse methods and media types into mapping options.
    pub fn options(&self) -> Result<MappingOptions, MetadataError> {
        let methods = self
            .methods
            .iter()
            .map(|m| m.parse::<Method>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| MetadataError::Method {
                uri: self.uri.clone(),
                source,
            })?;
        let media_types = self
            .media_types
            .iter()
            .map(|m| MediaType::parse(m))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| MetadataError::MediaType {
                uri: self.uri.clone(),
                source,
            })?;

        Ok(MappingOptions {
            enabled: self.enabled,
            methods,
            media_types,
        })
    }
}

impl MetadataDocument {
    /// Parse a metadata file's bytes; `name` selects the format and labels errors.
    pub fn parse(name: &str, bytes: &[u8]) -> Result<Self, MetadataError> {
        if bytes.len() as u64 > MAX_METADATA_BYTES {
            return Err(MetadataError::TooLarge {
                name: name.to_string(),
                limit: MAX_METADATA_BYTES,
            });
        }
        let format = MetadataFormat::from_name(name)
            .ok_or_else(|| MetadataError::UnsupportedFormat(name.to_string()))?;

        match format {
            MetadataFormat::Json => serde_json::from_slice(bytes).map_err(|source| MetadataError::Json {
                name: name.to_string(),
                source,
            }),
            MetadataFormat::Toml => {
                let text = std::str::from_utf8(bytes).map_err(|_| MetadataError::Encoding {
                    name: name.to_string(),
                })?;
                toml::from_str(text).map_err(|source| MetadataError::Toml {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }
}
