//! Request orchestration: rewrite, client lookup, call, render.

use std::sync::Arc;

use tokio::time::{timeout_at, Instant};

use crate::client::{ClientCache, ReqwestClientFactory};
use crate::config::{KubernetesConfig, ProxyConfig, TimeoutConfig};
use crate::observability::BuildInfo;
use crate::proxy::error::ProxyError;
use crate::proxy::render::ProxyResponse;
use crate::proxy::request::{ProxyRequest, ResponseMode};
use crate::proxy::rewrite::RequestRewriter;
use crate::resilience::CircuitBreakerRegistry;
use crate::upstream::{RouteKind, UpstreamTarget};

const JSON: &str = "application/json";
const JSON_SEQ: &str = "application/json-seq";

/// Entry point for the three proxy routes.
pub struct ProxyPipeline {
    cache: Arc<ClientCache>,
    rewriter: RequestRewriter,
    api_server: UpstreamTarget,
    api_server_tls: bool,
    timeouts: TimeoutConfig,
}

impl ProxyPipeline {
    pub fn new(
        cache: Arc<ClientCache>,
        rewriter: RequestRewriter,
        kubernetes: &KubernetesConfig,
        timeouts: TimeoutConfig,
    ) -> Self {
        let api_server = UpstreamTarget::new(
            kubernetes.api_server.clone(),
            kubernetes.api_server_port,
            RouteKind::ApiServer.protocol(kubernetes.api_server_tls),
        );
        Self {
            cache,
            rewriter,
            api_server,
            api_server_tls: kubernetes.api_server_tls,
            timeouts,
        }
    }

    /// Wire the production stack: breaker registry, reqwest factory, cache.
    pub fn from_config(config: &ProxyConfig, bearer_token: Option<&str>) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker.clone()));
        let factory = ReqwestClientFactory::new(config.client.clone(), &config.kubernetes, breakers);
        let cache = Arc::new(ClientCache::new(Arc::new(factory)));
        let rewriter = RequestRewriter::new(
            &config.kubernetes.api_uri_prefix,
            &BuildInfo::current().user_agent(),
            bearer_token,
        );
        if !rewriter.has_credentials() {
            tracing::warn!("No bearer token available; control-plane routes will fail");
        }
        Self::new(cache, rewriter, &config.kubernetes, config.timeouts.clone())
    }

    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    pub fn api_server(&self) -> &UpstreamTarget {
        &self.api_server
    }

    /// `/api/{actual_uri}` against the configured control plane. Watches with a
    /// positive `timeoutSeconds` are streamed; everything else is buffered.
    pub async fn proxy_api_server(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let mode = request.response_mode(&self.timeouts);
        let default_content_type = if mode.is_streaming() { JSON_SEQ } else { JSON };
        self.forward(
            RouteKind::ApiServer,
            self.api_server.clone(),
            request,
            mode,
            Some(default_content_type),
        )
        .await
    }

    /// `/apiservers/{host}/{port}/{actual_uri}`, always buffered.
    pub async fn proxy_api_server_metrics(
        &self,
        host: &str,
        port: u16,
        request: ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let route = RouteKind::ApiServerMetrics;
        let target = UpstreamTarget::new(host, port, route.protocol(self.api_server_tls));
        self.forward(route, target, request, self.buffered(), None).await
    }

    /// `/pods/{host}/{port}/{actual_uri}` over plain HTTP/1.1, always buffered.
    pub async fn proxy_pod_metrics(
        &self,
        host: &str,
        port: u16,
        request: ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let route = RouteKind::PodMetrics;
        let target = UpstreamTarget::new(host, port, route.protocol(self.api_server_tls));
        self.forward(route, target, request, self.buffered(), None).await
    }

    fn buffered(&self) -> ResponseMode {
        ResponseMode::Buffered {
            timeout: std::time::Duration::from_secs(self.timeouts.request_secs),
        }
    }

    async fn forward(
        &self,
        route: RouteKind,
        target: UpstreamTarget,
        request: ProxyRequest,
        mode: ResponseMode,
        default_content_type: Option<&'static str>,
    ) -> Result<ProxyResponse, ProxyError> {
        let result = self
            .exchange(route, &target, request, mode, default_content_type)
            .await;
        if let Err(e) = &result {
            log_failure(route, &target, e);
        }
        result
    }

    async fn exchange(
        &self,
        route: RouteKind,
        target: &UpstreamTarget,
        request: ProxyRequest,
        mode: ResponseMode,
        default_content_type: Option<&'static str>,
    ) -> Result<ProxyResponse, ProxyError> {
        let outbound = self.rewriter.rewrite(
            route,
            &request.inbound_headers,
            &request.actual_uri,
            &request.query,
        )?;
        let client = self.cache.get(target, route)?;
        let limit = client.max_response_bytes();
        let deadline = Instant::now() + mode.timeout();

        tracing::debug!(
            upstream = %target,
            path = %outbound.path_and_query,
            streaming = mode.is_streaming(),
            timeout_secs = mode.timeout().as_secs(),
            "Proxying request"
        );

        let call = client.get(&outbound.path_and_query, outbound.headers, mode.timeout());
        match mode {
            ResponseMode::Streaming { .. } => {
                let upstream = timeout_at(deadline, call)
                    .await
                    .map_err(|_| ProxyError::Timeout)??;
                Ok(ProxyResponse::streaming(
                    upstream,
                    limit,
                    deadline,
                    default_content_type,
                ))
            }
            ResponseMode::Buffered { .. } => timeout_at(deadline, async {
                let upstream = call.await?;
                ProxyResponse::buffered(upstream, limit, default_content_type).await
            })
            .await
            .map_err(|_| ProxyError::Timeout)?,
        }
    }
}

fn log_failure(route: RouteKind, target: &UpstreamTarget, error: &ProxyError) {
    let peer = match route {
        RouteKind::ApiServer => "the Kubernetes API server",
        RouteKind::ApiServerMetrics => "an API server",
        RouteKind::PodMetrics => "a pod",
    };
    match error {
        ProxyError::CircuitOpen { .. } => {
            tracing::warn!(upstream = %target, error = %error, "Can't proxy to {peer}");
        }
        _ => {
            tracing::error!(upstream = %target, error = %error, "Can't proxy to {peer}");
        }
    }
}
