//! End-to-end request handling over HTTP.

use reqwest::StatusCode;

mod common;

use common::{config_in, route_bundle, security_bundle, start_server};

async fn server_with_bundles() -> (common::TestServer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    std::fs::create_dir_all(dir.path().join("route")).unwrap();
    std::fs::create_dir_all(dir.path().join("security")).unwrap();

    route_bundle(
        &dir.path().join("route"),
        "app.zip",
        &[
            r#"{"uri": "/hello", "provider": "hello", "methods": ["GET"]}"#,
            r#"{"uri": "/users/{id}", "provider": "user"}"#,
            r#"{"uri": "/tagged", "provider": "tagged"}"#,
            r#"{"uri": "/items", "provider": "created", "methods": ["POST"], "mediaTypes": ["application/json"]}"#,
            r#"{"uri": "/admin/panel", "provider": "hello"}"#,
        ],
    );
    security_bundle(
        &dir.path().join("security"),
        "auth.zip",
        &[r#"{"uri": "/admin/panel", "provider": "token"}"#],
    );

    (start_server(config).await, dir)
}

#[tokio::test]
async fn test_ping_and_routes() {
    let (server, _dir) = server_with_bundles().await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/ping")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "pong");

    let res = client.get(server.url("/HELLO/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "hello");

    let res = client.get(server.url("/users/42?x=1")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "user 42");

    let res = client.get(server.url("/users/john%20doe")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "user john doe");
}

#[tokio::test]
async fn test_error_statuses() {
    let (server, _dir) = server_with_bundles().await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/missing")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body = res.text().await.unwrap();
    assert!(body.contains("statusCode: 404"));

    let res = client.delete(server.url("/hello")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()["allow"], "GET");

    let res = client
        .post(server.url("/items"))
        .header("content-type", "text/plain")
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let res = client
        .post(server.url("/items"))
        .header("content-type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client.request(reqwest::Method::from_bytes(b"BREW").unwrap(), server.url("/hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_security_predicate() {
    let (server, _dir) = server_with_bundles().await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/admin/panel")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(server.url("/admin/panel"))
        .header("x-token", "secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_conditional_requests() {
    let (server, _dir) = server_with_bundles().await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/tagged")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["etag"], "\"v1\"");

    let res = client
        .get(server.url("/tagged"))
        .header("if-none-match", "\"v1\"")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_MODIFIED);

    let res = client
        .put(server.url("/tagged"))
        .header("if-match", "\"v0\"")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_oversized_body() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.listener.max_content_length = 16;
    let server = start_server(config).await;

    let res = reqwest::Client::new()
        .post(server.url("/ping"))
        .body(vec![b'x'; 64])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
