//! Embeddable HTTP server core with hot-reloadable route and security bundles.

pub mod bundle;
pub mod conditional;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use bundle::{BundleScanner, DirectoryWatcher, ProviderTable, Resolver};
pub use config::schema::ServerConfig;
pub use http::{HttpServer, Request, Response};
pub use lifecycle::{bootstrap, Services, Shutdown};
pub use routing::{Dispatcher, Mapping, RouteRegistry, SecurityRegistry};
