//! Upstream endpoints and the routes that reach them.

use std::fmt;

/// Wire protocol spoken to an upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// HTTP/2 over TLS, negotiated through ALPN.
    H2,
    /// HTTP/2 cleartext with prior knowledge.
    H2C,
    /// Plaintext HTTP/1.1.
    H1C,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::H2 => "https",
            Protocol::H2C | Protocol::H1C => "http",
        }
    }
}

/// A (host, port, protocol) triple identifying one upstream endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamTarget {
    host: String,
    port: u16,
    protocol: Protocol,
}

impl UpstreamTarget {
    pub fn new(host: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Cache identity: `host:port`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `scheme://host:port`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The three inbound routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// `/api/{actualUri}` to the configured control plane.
    ApiServer,
    /// `/apiservers/{host}/{port}/{actualUri}`.
    ApiServerMetrics,
    /// `/pods/{host}/{port}/{actualUri}`.
    PodMetrics,
}

impl RouteKind {
    /// Control-plane calls carry the bearer token; pod scrapes never do.
    pub fn attaches_credentials(&self) -> bool {
        !matches!(self, RouteKind::PodMetrics)
    }

    /// Protocol for this route given whether API servers are reached over TLS.
    pub fn protocol(&self, api_server_tls: bool) -> Protocol {
        match self {
            RouteKind::PodMetrics => Protocol::H1C,
            _ if api_server_tls => Protocol::H2,
            _ => Protocol::H2C,
        }
    }

    /// Breakers for API servers are named for observability. Pod breakers
    /// stay anonymous.
    pub fn breaker_name(&self, host: &str) -> Option<String> {
        match self {
            RouteKind::PodMetrics => None,
            _ => Some(format!("kube-apiserver_{host}")),
        }
    }

    pub fn caps_response_size(&self) -> bool {
        !matches!(self, RouteKind::PodMetrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_host_and_port() {
        let target = UpstreamTarget::new("10.0.0.1", 6443, Protocol::H2);
        assert_eq!(target.key(), "10.0.0.1:6443");
        assert_eq!(target.base_url(), "https://10.0.0.1:6443");
    }

    #[test]
    fn pod_routes_are_plain_http1() {
        assert_eq!(RouteKind::PodMetrics.protocol(true), Protocol::H1C);
        assert_eq!(RouteKind::ApiServer.protocol(true), Protocol::H2);
        assert_eq!(RouteKind::ApiServerMetrics.protocol(false), Protocol::H2C);
        assert!(!RouteKind::PodMetrics.attaches_credentials());
        assert!(RouteKind::ApiServerMetrics.attaches_credentials());
    }

    #[test]
    fn only_api_server_breakers_are_named() {
        assert_eq!(
            RouteKind::ApiServer.breaker_name("master-1").as_deref(),
            Some("kube-apiserver_master-1")
        );
        assert_eq!(RouteKind::PodMetrics.breaker_name("10.1.2.3"), None);
    }
}
