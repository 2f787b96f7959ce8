//! Call interceptors wrapped around every cached upstream client.
//!
//! Both layers operate on `reqwest::Request -> reqwest::Response` services
//! whose error type is already [`ProxyError`]. The factory stacks them as
//! metrics (outermost) then circuit breaker, so breaker rejections show up
//! in the call counters.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use crate::observability::metrics;
use crate::proxy::ProxyError;
use crate::resilience::CircuitBreaker;

/// Gates calls through a host's [`CircuitBreaker`] and reports their outcome.
#[derive(Clone)]
pub struct CircuitBreakerLayer {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerLayer {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            breaker: self.breaker.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreakerService<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
}

impl<S> Service<reqwest::Request> for CircuitBreakerService<S>
where
    S: Service<reqwest::Request, Response = reqwest::Response, Error = ProxyError>,
    S::Future: Send + 'static,
{
    type Response = reqwest::Response;
    type Error = ProxyError;
    type Future = BoxFuture<'static, Result<reqwest::Response, ProxyError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: reqwest::Request) -> Self::Future {
        let breaker = self.breaker.clone();
        if !breaker.try_acquire() {
            let host = breaker.host().to_string();
            return Box::pin(async move { Err(ProxyError::CircuitOpen { host }) });
        }

        let call = self.inner.call(request);
        Box::pin(async move {
            let result = call.await;
            match &result {
                Ok(response) if response.status().is_server_error() => breaker.on_failure(),
                Ok(_) => breaker.on_success(),
                Err(_) => breaker.on_failure(),
            }
            result
        })
    }
}

/// Records per-target call counts and time to response headers.
#[derive(Clone)]
pub struct MetricsLayer {
    server: Arc<str>,
}

impl MetricsLayer {
    /// `server` is the `host:port` label attached to every sample.
    pub fn new(server: impl Into<Arc<str>>) -> Self {
        Self {
            server: server.into(),
        }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            server: self.server.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    server: Arc<str>,
}

impl<S> Service<reqwest::Request> for MetricsService<S>
where
    S: Service<reqwest::Request, Response = reqwest::Response, Error = ProxyError>,
    S::Future: Send + 'static,
{
    type Response = reqwest::Response;
    type Error = ProxyError;
    type Future = BoxFuture<'static, Result<reqwest::Response, ProxyError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: reqwest::Request) -> Self::Future {
        let server = self.server.clone();
        let start = Instant::now();
        let call = self.inner.call(request);
        Box::pin(async move {
            let result = call.await;
            match &result {
                Ok(response) => metrics::record_upstream_call(
                    &server,
                    metrics::status_outcome(response.status().as_u16()),
                    start.elapsed(),
                ),
                Err(ProxyError::CircuitOpen { .. }) => metrics::record_upstream_rejected(&server),
                Err(_) => metrics::record_upstream_call(&server, "error", start.elapsed()),
            }
            result
        })
    }
}
