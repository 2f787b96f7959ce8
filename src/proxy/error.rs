//! Failures surfaced by the proxy pipeline.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The target host's breaker rejected the call before it was attempted.
    #[error("circuit open for upstream host {host}")]
    CircuitOpen { host: String },

    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The inbound deadline elapsed before the exchange finished.
    #[error("request timed out")]
    Timeout,

    #[error("upstream response exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("no bearer token configured for a control-plane call")]
    MissingBearerToken,

    #[error("invalid upstream uri: {0}")]
    InvalidUpstreamUri(String),

    #[error("failed to build upstream client: {0}")]
    ClientBuild(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Transport(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Transport(_) | ProxyError::ResponseTooLarge { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::MissingBearerToken | ProxyError::ClientBuild(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::InvalidUpstreamUri(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
