//! End-to-end routing and rewriting through a running proxy.

use axum::body::Body;
use axum::http::{HeaderMap, Uri, Version};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use reqwest::StatusCode;

mod common;

#[tokio::test]
async fn pod_metrics_pass_through_without_credentials() {
    let (backend, mut seen) =
        common::start_recording_backend(200, "text/plain; version=0.0.4", "up 1\n").await;
    let proxy = common::start_proxy(common::test_config(None)).await;

    let res = common::client()
        .get(proxy.url(&format!("/pods/127.0.0.1/{}/metrics", backend.port())))
        .header("accept-encoding", "gzip")
        .header("authorization", "Bearer from-scraper")
        .send()
        .await
        .expect("Proxy unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/plain; version=0.0.4");
    assert_eq!(res.text().await.unwrap(), "up 1\n");

    let upstream = seen.recv().await.unwrap();
    assert_eq!(upstream.request_line, "GET /metrics HTTP/1.1");
    assert_eq!(upstream.header("authorization"), None);
    assert_eq!(upstream.header("accept-encoding"), None);
    assert!(upstream.header("user-agent").unwrap().starts_with("psystrike/"));
    assert!(upstream.header("x-request-id").is_some());
}

#[tokio::test]
async fn api_server_metrics_carry_the_bearer_token() {
    let api = common::start_api_server(Router::new().route(
        "/metrics",
        get(|headers: HeaderMap, version: Version| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string();
            format!("{auth}|{version:?}")
        }),
    ))
    .await;
    let proxy = common::start_proxy(common::test_config(None)).await;

    let res = common::client()
        .get(proxy.url(&format!("/apiservers/127.0.0.1/{}/metrics", api.port())))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "Bearer test-token|HTTP/2.0");
}

#[tokio::test]
async fn api_route_keeps_prefix_and_query_order() {
    let api = common::start_api_server(Router::new().route(
        "/k8s/api/{*rest}",
        get(|uri: Uri| async move {
            let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("");
            Response::new(Body::from(path.to_string()))
        }),
    ))
    .await;
    let mut config = common::test_config(Some(api));
    config.kubernetes.api_uri_prefix = "/k8s/".to_string();
    let proxy = common::start_proxy(config).await;

    let res = common::client()
        .get(proxy.url("/api/v1/pods?limit=500&labelSelector=app%3Dweb&limit=10"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/json");
    assert_eq!(
        res.text().await.unwrap(),
        "/k8s/api/v1/pods?limit=500&labelSelector=app%3Dweb&limit=10"
    );
}

#[tokio::test]
async fn upstream_client_errors_pass_through() {
    let (backend, _seen) = common::start_recording_backend(404, "text/plain", "no such path").await;
    let proxy = common::start_proxy(common::test_config(None)).await;

    let res = common::client()
        .get(proxy.url(&format!("/pods/127.0.0.1/{}/nope", backend.port())))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "no such path");
}

#[tokio::test]
async fn unreachable_pod_is_a_bad_gateway() {
    let dead = common::unused_addr().await;
    let proxy = common::start_proxy(common::test_config(None)).await;

    let res = common::client()
        .get(proxy.url(&format!("/pods/127.0.0.1/{}/metrics", dead.port())))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn missing_token_fails_control_plane_routes_only() {
    let (backend, _seen) = common::start_recording_backend(200, "text/plain", "up 1\n").await;
    let mut config = common::test_config(None);
    config.kubernetes.bearer_token = None;
    let proxy = common::start_proxy(config).await;
    let client = common::client();

    let res = client
        .get(proxy.url(&format!("/apiservers/127.0.0.1/{}/metrics", backend.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let res = client
        .get(proxy.url(&format!("/pods/127.0.0.1/{}/metrics", backend.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn internal_healthcheck_is_served() {
    let proxy = common::start_proxy(common::test_config(None)).await;

    let res = common::client()
        .get(proxy.url("/internal/healthcheck"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), r#"{"status":"ok"}"#);
}
