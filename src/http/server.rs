//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (tracing, body limit, timeout, request ID)
//! - Convert between wire requests/responses and the dispatcher's types
//! - Run dispatch off the async workers (handlers are blocking closures)
//! - Serve until the shutdown signal fires, then drain
//!
//! # Design Decisions
//! - Every path goes through the dispatcher; Axum does no routing of its own
//! - Unknown methods are answered with 501 before dispatch
//! - Oversized bodies are answered with 413

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response as AxumResponse},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::schema::ListenerConfig;
use crate::http::method::{Method, Version};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics;
use crate::routing::dispatcher::{DispatchError, Dispatcher};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub max_content_length: usize,
}

/// Generates a UUID v4 for requests that arrive without an `x-request-id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// HTTP front end for a [`Dispatcher`].
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(dispatcher: Arc<Dispatcher>, listener: &ListenerConfig) -> Self {
        let state = AppState {
            dispatcher,
            max_content_length: listener.max_content_length,
        };
        let router = Self::build_router(state, listener.read_timeout());
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, timeout: Duration) -> Router {
        let limit = state.max_content_length;
        Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(limit))
                    .layer(TimeoutLayer::new(timeout)),
            )
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn dispatch_handler(State(state): State<AppState>, request: axum::extract::Request) -> AxumResponse {
    let start_time = Instant::now();
    let method_label = request.method().as_str().to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = match into_core_request(request, state.max_content_length).await {
        Ok(request) => {
            tracing::debug!(
                request_id = %request_id,
                method = %request.method(),
                path = %request.path(),
                "Dispatching request"
            );
            let dispatcher = Arc::clone(&state.dispatcher);
            match tokio::task::spawn_blocking(move || dispatcher.respond(request)).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(request_id = %request_id, error = %e, "Dispatch task failed");
                    DispatchError::Internal(e.to_string()).into_response()
                }
            }
        }
        Err(e) => {
            tracing::debug!(request_id = %request_id, error = %e, "Rejected request before dispatch");
            e.into_response()
        }
    };

    let status = response.status().code();
    metrics::record_request(&method_label, status, start_time);
    into_axum_response(response)
}

async fn into_core_request(request: axum::extract::Request, limit: usize) -> Result<Request, DispatchError> {
    let (parts, body) = request.into_parts();

    let method: Method = parts
        .method
        .as_str()
        .parse()
        .map_err(|_| DispatchError::NotImplemented(parts.method.to_string()))?;

    let content = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| DispatchError::PayloadTooLarge { limit })?;

    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let version = Version::from(parts.version);
    let keep_alive = keep_alive(version, &parts.headers);

    Ok(Request::new(method, target)
        .with_version(version)
        .with_headers(parts.headers)
        .with_keep_alive(keep_alive)
        .with_content(content))
}

fn keep_alive(version: Version, headers: &header::HeaderMap) -> bool {
    let connection = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase);
    match connection.as_deref() {
        Some("close") => false,
        Some("keep-alive") => true,
        _ => version != Version::Http10,
    }
}

fn into_axum_response(response: Response) -> AxumResponse {
    let (status, headers, media_type, content) = response.into_parts();
    let code = StatusCode::from_u16(status.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut out = (code, Body::from(content)).into_response();
    out.headers_mut().extend(headers);
    if let Some(media_type) = media_type {
        if !out.headers().contains_key(header::CONTENT_TYPE) {
            if let Ok(value) = HeaderValue::from_str(&media_type.to_string()) {
                out.headers_mut().insert(header::CONTENT_TYPE, value);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::media_type::MediaType;
    use crate::http::status::Status;

    #[test]
    fn test_response_conversion() {
        let response = Response::ok()
            .text("pong")
            .header(header::ETAG, "\"v1\"");
        let out = into_axum_response(response);

        assert_eq!(out.status(), StatusCode::OK);
        assert_eq!(out.headers()[header::ETAG], "\"v1\"");
        let content_type = out.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[test]
    fn test_response_conversion_without_body() {
        let out = into_axum_response(Response::new(Status::NoContent));
        assert_eq!(out.status(), StatusCode::NO_CONTENT);
        assert!(!out.headers().contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn test_json_media_type() {
        let out = into_axum_response(Response::ok().content("{}").media_type(MediaType::json()));
        assert_eq!(out.headers()[header::CONTENT_TYPE], MediaType::json().to_string().as_str());
    }

    #[test]
    fn test_keep_alive_rules() {
        let mut headers = header::HeaderMap::new();
        assert!(keep_alive(Version::Http11, &headers));
        assert!(!keep_alive(Version::Http10, &headers));

        headers.insert(header::CONNECTION, HeaderValue::from_static("Close"));
        assert!(!keep_alive(Version::Http11, &headers));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        assert!(keep_alive(Version::Http10, &headers));
    }

    #[tokio::test]
    async fn test_unknown_method_is_not_implemented() {
        let request = axum::http::Request::builder()
            .method("BREW")
            .uri("/pot")
            .body(Body::empty())
            .unwrap();
        let err = into_core_request(request, 1024).await.unwrap_err();
        assert_eq!(err.status(), Status::NotImplemented);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::from(vec![0u8; 32]))
            .unwrap();
        let err = into_core_request(request, 16).await.unwrap_err();
        assert_eq!(err.status(), Status::RequestEntityTooLarge);
    }

    fn router_with_ping(limit: usize) -> Router {
        use crate::routing::mapping::{Mapping, RouteHandler};
        use crate::routing::registry::{RouteRegistry, SecurityRegistry};

        let routes = Arc::new(RouteRegistry::new("route"));
        let pong: RouteHandler = Arc::new(|_: &Request| Response::ok().text("pong"));
        routes.register(Mapping::simple("/ping", pong).unwrap());
        let state = AppState {
            dispatcher: Arc::new(Dispatcher::new(routes, Arc::new(SecurityRegistry::new("security")))),
            max_content_length: limit,
        };
        HttpServer::build_router(state, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_router_layers_serve_and_limit() {
        use tower::ServiceExt;

        let ok = router_with_ping(16)
            .oneshot(axum::http::Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert!(ok.headers().contains_key(X_REQUEST_ID));

        let too_big = router_with_ping(16)
            .oneshot(
                axum::http::Request::post("/ping")
                    .header(header::CONTENT_LENGTH, "64")
                    .body(Body::from(vec![b'x'; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(too_big.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_run_stops_on_earlier_shutdown() {
        use crate::lifecycle::shutdown::Shutdown;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = HttpServer {
            router: router_with_ping(16),
        };
        let shutdown = Shutdown::new();
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(5), server.run(listener, shutdown.signal()))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_request_conversion() {
        let request = axum::http::Request::builder()
            .method("get")
            .uri("/users/7/?verbose=1")
            .header("accept", "text/plain")
            .body(Body::empty())
            .unwrap();
        let core = into_core_request(request, 1024).await.unwrap();
        assert_eq!(core.method(), Method::Get);
        assert_eq!(core.path(), "/users/7");
        assert_eq!(core.params().get("verbose"), Some("1"));
    }
}
