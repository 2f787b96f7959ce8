//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the three proxy routes and internal endpoints
//! - Wire up middleware (tracing, request ID)
//! - Turn path captures and query strings into `ProxyRequest`s
//! - Run the idle client sweeper alongside the listener
//! - Serve until the shutdown signal, then drain

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::client::IdleSweeper;
use crate::config::{loader, ProxyConfig};
use crate::proxy::{ProxyPipeline, ProxyRequest};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ProxyPipeline>,
    pub metrics: Option<PrometheusHandle>,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    config: ProxyConfig,
    pipeline: Arc<ProxyPipeline>,
    metrics: Option<PrometheusHandle>,
}

impl HttpServer {
    /// Create a server with the production pipeline. The bearer token is
    /// resolved here, once.
    pub fn new(config: ProxyConfig) -> Self {
        let token = loader::resolve_bearer_token(&config.kubernetes);
        let pipeline = Arc::new(ProxyPipeline::from_config(&config, token.as_deref()));
        Self::with_pipeline(config, pipeline)
    }

    pub fn with_pipeline(config: ProxyConfig, pipeline: Arc<ProxyPipeline>) -> Self {
        Self {
            config,
            pipeline,
            metrics: None,
        }
    }

    /// Serve this recorder's rendering on `/internal/metrics`.
    pub fn with_metrics_handle(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        let state = AppState {
            pipeline: self.pipeline.clone(),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/api/{*actual_uri}", get(proxy_api_server))
            .route(
                "/apiservers/{host}/{port}/{*actual_uri}",
                get(proxy_api_server_metrics),
            )
            .route("/pods/{host}/{port}/{*actual_uri}", get(proxy_pod_metrics))
            .route("/internal/healthcheck", get(healthcheck))
            .route("/internal/metrics", get(render_metrics))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            api_server = %self.pipeline.api_server(),
            "HTTP server starting"
        );

        let sweeper = IdleSweeper::new(
            self.pipeline.cache().clone(),
            self.config.cleanup_timer.clone(),
        )
        .spawn(shutdown.resubscribe());

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await;

        // The sweeper only hears the shutdown signal; stop it on a serve error too.
        if served.is_err() {
            sweeper.abort();
        }
        match sweeper.await {
            Err(e) if !e.is_cancelled() => {
                tracing::warn!(error = %e, "Idle client sweeper ended abnormally");
            }
            _ => {}
        }

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TargetParams {
    host: String,
    port: u16,
}

/// The path after its first `segments` segments, still percent-encoded.
fn remainder(path: &str, segments: usize) -> &str {
    path.trim_start_matches('/')
        .splitn(segments + 1, '/')
        .nth(segments)
        .unwrap_or("")
}

async fn proxy_api_server(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let request = ProxyRequest::new(remainder(uri.path(), 1), uri.query(), headers);
    state.pipeline.proxy_api_server(request).await.into_response()
}

async fn proxy_api_server_metrics(
    State(state): State<AppState>,
    Path(target): Path<TargetParams>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = ProxyRequest::new(remainder(uri.path(), 3), uri.query(), headers);
    state
        .pipeline
        .proxy_api_server_metrics(&target.host, target.port, request)
        .await
        .into_response()
}

async fn proxy_pod_metrics(
    State(state): State<AppState>,
    Path(target): Path<TargetParams>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = ProxyRequest::new(remainder(uri.path(), 3), uri.query(), headers);
    state
        .pipeline
        .proxy_pod_metrics(&target.host, target.port, request)
        .await
        .into_response()
}

async fn healthcheck() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
