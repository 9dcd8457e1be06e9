//! Hot-reloadable bundles.
//!
//! # Data Flow
//! ```text
//! route/ or security/ directory
//!     → watcher.rs (notify events → debounced Created/Modified/Removed/Overflow)
//!     → scanner.rs (read archive, parse metadata.rs documents)
//!     → resolver.rs (provider reference → handler)
//!     → routing::Registry (register / unregister)
//! ```
//!
//! # Design Decisions
//! - One scanner and one watcher thread per directory; route and security are independent
//! - Provider resolution happens only here, never while serving a request
//! - The ledger keeps the mapping instances each bundle registered so removal is exact

pub mod metadata;
pub mod resolver;
pub mod scanner;
pub mod watcher;

pub use metadata::{Entry, MetadataDocument, MetadataError};
pub use resolver::{Handler, HandlerKind, ProviderHandler, ProviderTable, ResolutionError, Resolver};
pub use scanner::{BundleError, BundleScanner, ScanReport, ScanSettings};
pub use watcher::{DirectoryWatcher, NotifyChannel, WatchBackend, WatchChannel, WatchError, WatchEvent};
