//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (startup, bundle scans):
//!     uri template
//!     → uri.rs (normalize, classify)
//!     → matcher.rs (compile ExactMatcher | TemplateMatcher)
//!     → mapping.rs (immutable Mapping record)
//!     → registry.rs (publish new snapshot)
//!
//! Incoming Request:
//!     → dispatcher.rs
//!     → registry.rs (first enabled match, key order)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Registries are explicit values shared through `Arc`, never globals
//! - Templates are compiled once at registration, never on the request path
//! - First match wins; a broad regex registered under an earlier key shadows later ones

pub mod dispatcher;
pub mod mapping;
pub mod matcher;
pub mod registry;
pub mod uri;

pub use dispatcher::{DispatchError, Dispatcher};
pub use mapping::{Mapping, MappingOptions, RouteHandler, SecurityHandler};
pub use matcher::{compile, ExactMatcher, MatchCompilationError, TemplateMatcher, UrlMatch, UrlMatcher};
pub use registry::{Registry, RouteRegistry, SecurityRegistry};
