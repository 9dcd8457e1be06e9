//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, limits, conversion)
//!     → request.rs (method, normalized path, params, headers, body)
//!     → [routing::Dispatcher picks the handler]
//!     → response.rs (status, headers, media type, body)
//!     → Send to client
//! ```

pub mod media_type;
pub mod method;
pub mod request;
pub mod response;
pub mod server;
pub mod status;

pub use media_type::{MediaType, MediaTypeError};
pub use method::{Method, UnknownMethod, Version};
pub use request::{Params, Request};
pub use response::Response;
pub use server::{HttpServer, X_REQUEST_ID};
pub use status::{Family, Status};
