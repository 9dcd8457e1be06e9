//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! Request
//!     → security registry   (deny → 401)
//!     → route registry      (no enabled match → 404)
//!     → path parameters appended to the request
//!     → method check        (→ 405 + Allow)
//!     → media type checks   (Content-Type → 415, Accept → 406)
//!     → route handler       (panic → 500)
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

use crate::http::media_type::MediaType;
use crate::http::method::Method;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::status::Status;
use crate::routing::registry::{RouteRegistry, SecurityRegistry};

/// A dispatch failure that maps to an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Access denied for the uri {path}")]
    Unauthorized { path: String },

    #[error("Route mapping not found for the method {method} and uri {path}")]
    NotFound { method: Method, path: String },

    #[error("Method {method} not allowed for the request uri {path}")]
    MethodNotAllowed {
        method: Method,
        path: String,
        allowed: Vec<Method>,
    },

    #[error("Unsupported {media_type} media type for the request uri {path}")]
    UnsupportedMediaType { media_type: String, path: String },

    #[error("None of the acceptable media types [{accept}] can be produced for the request uri {path}")]
    NotAcceptable { accept: String, path: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("Request content exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Method {0} is not implemented")]
    NotImplemented(String),

    #[error("Request handling exceeded the read timeout")]
    Timeout,

    #[error("{0}")]
    Internal(String),
}

impl DispatchError {
    pub fn status(&self) -> Status {
        match self {
            DispatchError::Unauthorized { .. } => Status::Unauthorized,
            DispatchError::NotFound { .. } => Status::NotFound,
            DispatchError::MethodNotAllowed { .. } => Status::MethodNotAllowed,
            DispatchError::UnsupportedMediaType { .. } => Status::UnsupportedMediaType,
            DispatchError::NotAcceptable { .. } => Status::NotAcceptable,
            DispatchError::BadRequest(_) => Status::BadRequest,
            DispatchError::PayloadTooLarge { .. } => Status::RequestEntityTooLarge,
            DispatchError::NotImplemented(_) => Status::NotImplemented,
            DispatchError::Timeout => Status::RequestTimeout,
            DispatchError::Internal(_) => Status::InternalServerError,
        }
    }

    /// Plain-text error response describing the failure.
    pub fn into_response(self) -> Response {
        let status = self.status();
        let body = [
            format!("statusCode: {}", status.code()),
            format!("statusMessage: {}", status.reason()),
            format!("statusFamily: {}", status.family().as_str()),
            format!("errorMessage: {self}"),
        ]
        .join("\r\n");

        let response = Response::new(status).text(body);
        match self {
            DispatchError::MethodNotAllowed { allowed, .. } => response.allow(&allowed),
            _ => response,
        }
    }
}

/// Routes requests through the security and route registries.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    routes: Arc<RouteRegistry>,
    security: Arc<SecurityRegistry>,
}

impl Dispatcher {
    pub fn new(routes: Arc<RouteRegistry>, security: Arc<SecurityRegistry>) -> Self {
        Self { routes, security }
    }

    pub fn routes(&self) -> &Arc<RouteRegistry> {
        &self.routes
    }

    pub fn security(&self) -> &Arc<SecurityRegistry> {
        &self.security
    }

    pub fn dispatch(&self, mut request: Request) -> Result<Response, DispatchError> {
        let method = request.method();
        let path = request.path().to_string();

        if !self.is_authorized(&request)? {
            return Err(DispatchError::Unauthorized { path });
        }

        let (mapping, found) = self
            .routes
            .lookup(&path)
            .ok_or_else(|| DispatchError::NotFound {
                method,
                path: path.clone(),
            })?;

        for (name, value) in found.into_params() {
            request.params_mut().add(name, value);
        }

        if !mapping.allows_method(method) {
            return Err(DispatchError::MethodNotAllowed {
                method,
                path,
                allowed: mapping.methods().to_vec(),
            });
        }

        check_media_types(mapping.media_types(), &request)?;

        let handler = mapping.handler();
        catch_unwind(AssertUnwindSafe(|| handler(&request))).map_err(|panic| {
            let message = panic_message(panic.as_ref());
            tracing::error!(uri = %mapping.uri(), path = %path, error = %message, "Route handler panicked");
            DispatchError::Internal(message)
        })
    }

    /// Dispatch and render any failure as its error response.
    pub fn respond(&self, request: Request) -> Response {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(status = e.status().code(), error = %e, "Dispatch failed");
                e.into_response()
            }
        }
    }

    fn is_authorized(&self, request: &Request) -> Result<bool, DispatchError> {
        catch_unwind(AssertUnwindSafe(|| self.security.is_authorized(request))).map_err(|panic| {
            let message = panic_message(panic.as_ref());
            tracing::error!(path = %request.path(), error = %message, "Security handler panicked");
            DispatchError::Internal(message)
        })
    }
}

fn check_media_types(accepted: &[MediaType], request: &Request) -> Result<(), DispatchError> {
    if accepted.is_empty() {
        return Ok(());
    }

    if let Some(content_type) = request.content_type() {
        if !accepted.iter().any(|m| m.is_compatible(&content_type)) {
            return Err(DispatchError::UnsupportedMediaType {
                media_type: content_type.to_string(),
                path: request.path().to_string(),
            });
        }
    }

    let accept = request.accept();
    let any_accepted = accept.is_empty() || accept.iter().any(MediaType::is_wildcard);
    if !any_accepted && !accept.iter().any(|a| accepted.iter().any(|m| m.is_compatible(a))) {
        let listed = accept.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        return Err(DispatchError::NotAcceptable {
            accept: listed,
            path: request.path().to_string(),
        });
    }
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
