//! Construction of instrumented upstream clients.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};

use crate::config::{loader, ClientConfig, KubernetesConfig};
use crate::proxy::ProxyError;
use crate::resilience::CircuitBreakerRegistry;
use crate::upstream::{Protocol, RouteKind, UpstreamTarget};

use super::layers::{CircuitBreakerLayer, MetricsLayer};

/// A fully wrapped outbound call path.
pub type UpstreamService = BoxCloneSyncService<reqwest::Request, reqwest::Response, ProxyError>;

/// Builds the client for a target the first time the cache sees it.
pub trait ClientFactory: Send + Sync {
    fn build(&self, target: &UpstreamTarget, route: RouteKind) -> Result<UpstreamClient, ProxyError>;
}

/// Handle to a cached upstream client.
///
/// Cloning is cheap. A clone keeps working after the cache evicts the entry
/// it came from.
#[derive(Clone)]
pub struct UpstreamClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    target: UpstreamTarget,
    service: UpstreamService,
    max_response_bytes: Option<usize>,
}

impl UpstreamClient {
    pub fn new(
        target: UpstreamTarget,
        service: UpstreamService,
        max_response_bytes: Option<usize>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                target,
                service,
                max_response_bytes,
            }),
        }
    }

    pub fn target(&self) -> &UpstreamTarget {
        &self.inner.target
    }

    /// Response body cap, if this client enforces one.
    pub fn max_response_bytes(&self) -> Option<usize> {
        self.inner.max_response_bytes
    }

    /// Issue a GET for `path_and_query` against this client's target. The
    /// timeout covers the whole exchange, body included.
    pub async fn get(
        &self,
        path_and_query: &str,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<reqwest::Response, ProxyError> {
        let raw = format!("{}{}", self.inner.target.base_url(), path_and_query);
        let url = reqwest::Url::parse(&raw)
            .map_err(|e| ProxyError::InvalidUpstreamUri(format!("{raw}: {e}")))?;

        let mut request = reqwest::Request::new(reqwest::Method::GET, url);
        *request.headers_mut() = headers;
        *request.timeout_mut() = Some(timeout);
        self.call(request).await
    }

    pub async fn call(&self, request: reqwest::Request) -> Result<reqwest::Response, ProxyError> {
        self.inner.service.clone().oneshot(request).await
    }

    pub fn ptr_eq(&self, other: &UpstreamClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Builds `reqwest` clients wrapped with metrics and the host's breaker.
pub struct ReqwestClientFactory {
    config: ClientConfig,
    ca_cert: Option<reqwest::Certificate>,
    insecure_skip_tls_verify: bool,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl ReqwestClientFactory {
    pub fn new(
        config: ClientConfig,
        kubernetes: &KubernetesConfig,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        let ca_cert = loader::read_ca_cert(kubernetes).and_then(|pem| {
            reqwest::Certificate::from_pem(&pem)
                .map_err(|e| tracing::warn!(error = %e, "Ignoring unparseable CA bundle"))
                .ok()
        });

        Self {
            config,
            ca_cert,
            insecure_skip_tls_verify: kubernetes.insecure_skip_tls_verify,
            breakers,
        }
    }

    fn raw_client(&self, protocol: Protocol) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.config.response_timeout())
            .connect_timeout(self.config.connect_timeout())
            .pool_idle_timeout(self.config.pool_idle_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy();

        builder = match protocol {
            Protocol::H2 => {
                if let Some(cert) = &self.ca_cert {
                    builder = builder.add_root_certificate(cert.clone());
                }
                builder.danger_accept_invalid_certs(self.insecure_skip_tls_verify)
            }
            Protocol::H2C => builder.http2_prior_knowledge(),
            Protocol::H1C => builder.http1_only(),
        };

        builder.build()
    }
}

impl ClientFactory for ReqwestClientFactory {
    fn build(&self, target: &UpstreamTarget, route: RouteKind) -> Result<UpstreamClient, ProxyError> {
        let raw = self.raw_client(target.protocol()).map_err(|e| {
            tracing::error!(upstream = %target, error = %e, "Failed to build upstream client");
            ProxyError::ClientBuild(e.to_string())
        })?;

        let breaker = self
            .breakers
            .get_or_create(target.host(), route.breaker_name(target.host()));

        let service = ServiceBuilder::new()
            .layer(MetricsLayer::new(target.key()))
            .layer(CircuitBreakerLayer::new(breaker))
            .map_err(ProxyError::Transport)
            .service(raw);

        let max_response_bytes = route
            .caps_response_size()
            .then_some(self.config.max_response_bytes);

        tracing::debug!(
            upstream = %target,
            protocol = ?target.protocol(),
            max_response_bytes = ?max_response_bytes,
            "Built upstream client"
        );

        Ok(UpstreamClient::new(
            target.clone(),
            BoxCloneSyncService::new(service),
            max_response_bytes,
        ))
    }
}
