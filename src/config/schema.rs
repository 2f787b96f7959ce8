//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Kubernetes control plane and credentials.
    pub kubernetes: KubernetesConfig,

    /// Outbound client settings.
    pub client: ClientConfig,

    /// Inbound timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Idle client eviction schedule.
    pub cleanup_timer: CleanupTimerConfig,

    /// Per-host circuit breaker policy.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Kubernetes API server location and credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KubernetesConfig {
    /// Control-plane host used by the `/api` route.
    pub api_server: String,

    /// Control-plane port used by the `/api` route.
    pub api_server_port: u16,

    /// Speak HTTP/2 over TLS to API servers. When false, HTTP/2 cleartext
    /// with prior knowledge is used instead.
    pub api_server_tls: bool,

    /// Prefix inserted before `/api/` on control-plane calls.
    pub api_uri_prefix: String,

    /// Inline bearer token. Takes precedence over `bearer_token_file`.
    pub bearer_token: Option<String>,

    /// File holding the bearer token (service account mount by default).
    pub bearer_token_file: Option<String>,

    /// PEM bundle trusted for API server certificates, used when present.
    pub ca_cert_file: Option<String>,

    /// Skip API server certificate verification.
    pub insecure_skip_tls_verify: bool,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            api_server: "kubernetes.default.svc".to_string(),
            api_server_port: 443,
            api_server_tls: true,
            api_uri_prefix: String::new(),
            bearer_token: None,
            bearer_token_file: Some(
                "/var/run/secrets/kubernetes.io/serviceaccount/token".to_string(),
            ),
            ca_cert_file: Some("/var/run/secrets/kubernetes.io/serviceaccount/ca.crt".to_string()),
            insecure_skip_tls_verify: false,
        }
    }
}

/// Outbound client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Response size cap for API server routes. Pod routes are uncapped.
    pub max_response_bytes: usize,

    /// Upper bound on a whole upstream exchange, body included.
    ///
    /// Kubernetes picks watch timeouts in `[min, 2 * min]`, so this has to
    /// outlast the longest watch a scraper can open.
    pub response_timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// How long pooled upstream connections may sit idle.
    pub pool_idle_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_response_bytes: 100 * 1024 * 1024,
            response_timeout_secs: 600,
            connect_timeout_secs: 10,
            pool_idle_timeout_secs: 90,
        }
    }
}

impl ClientConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

/// Inbound timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for buffered (non-watch) requests in seconds.
    pub request_secs: u64,

    /// Added to a watch's `timeoutSeconds` so the proxy never cuts a watch
    /// before the upstream ends it.
    pub watch_buffer_secs: u64,

    /// How long in-flight requests may drain after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 10,
            watch_buffer_secs: 3,
            shutdown_grace_secs: 15,
        }
    }
}

/// Idle client eviction schedule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupTimerConfig {
    /// Delay before the first sweep in seconds.
    pub delay_secs: u64,

    /// Interval between sweeps in seconds.
    pub period_secs: u64,

    /// Clients unused for longer than this are evicted.
    pub remove_threshold_secs: u64,
}

impl Default for CleanupTimerConfig {
    fn default() -> Self {
        Self {
            delay_secs: 60,
            period_secs: 60,
            remove_threshold_secs: 300,
        }
    }
}

/// Circuit breaker policy shared by every per-host breaker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failure ratio above which the circuit opens.
    pub failure_rate_threshold: f64,

    /// Calls that must be seen in the window before the ratio is evaluated.
    pub minimum_request_threshold: u64,

    /// Spacing between trial requests while half-open.
    pub trial_request_interval_secs: u64,

    /// How long the circuit stays open before allowing a trial.
    pub circuit_open_window_secs: u64,

    /// Length of the sliding window over which outcomes are counted.
    pub counter_sliding_window_secs: u64,

    /// Bucket width of the sliding window.
    pub counter_update_interval_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.1,
            minimum_request_threshold: 1,
            trial_request_interval_secs: 5,
            circuit_open_window_secs: 10,
            counter_sliding_window_secs: 60,
            counter_update_interval_secs: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn trial_request_interval(&self) -> Duration {
        Duration::from_secs(self.trial_request_interval_secs)
    }

    pub fn circuit_open_window(&self) -> Duration {
        Duration::from_secs(self.circuit_open_window_secs)
    }

    pub fn counter_sliding_window(&self) -> Duration {
        Duration::from_secs(self.counter_sliding_window_secs)
    }

    pub fn counter_update_interval(&self) -> Duration {
        Duration::from_secs(self.counter_update_interval_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Install the Prometheus recorder and serve `/internal/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
        }
    }
}
